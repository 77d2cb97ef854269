use serde::{Deserialize, Serialize};

/// Coarse organisational classification, independent of roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Segment {
    NewJoiner,
    Employee,
    PlatformAdmin,
    Other(String),
}

impl Segment {
    /// Blank or missing markers default to `Employee`.
    /// Known markers match case-insensitively; anything else keeps its stored spelling.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "employee" => Segment::Employee,
            "new_joiner" | "new-joiner" | "newjoiner" => Segment::NewJoiner,
            "platform_admin" | "platform-admin" => Segment::PlatformAdmin,
            _ => Segment::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Segment::NewJoiner => "new_joiner",
            Segment::Employee => "employee",
            Segment::PlatformAdmin => "platform_admin",
            Segment::Other(s) => s.as_str(),
        }
    }
}

impl Default for Segment {
    fn default() -> Self { Segment::Employee }
}

impl From<String> for Segment {
    fn from(s: String) -> Self { Segment::parse(&s) }
}

impl From<Segment> for String {
    fn from(s: Segment) -> Self { s.as_str().to_string() }
}

/// Canonical server-resolved identity returned by `/auth/me`.
/// `roles` holds the primary role first, then every responsibility role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub new_joiner: bool,
    #[serde(default)]
    pub segment: Segment,
    #[serde(default)]
    pub domain: Option<String>,
}

impl UserContext {
    pub fn primary_role(&self) -> Option<&str> { self.roles.first().map(String::as_str) }
}

/// Role names are compared and returned lowercase with surrounding whitespace removed.
pub fn normalize_role(role: &str) -> String { role.trim().to_ascii_lowercase() }
