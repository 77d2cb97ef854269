//! Capability resolution: `UserContext` in, role predicates and an
//! (action, resource kind) rule set out. Pure; no I/O, no caching across contexts.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::user_context::{normalize_role, Segment, UserContext};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Publish,
    Moderate,
    Manage,
}

impl Action {
    pub const ALL: [Action; 7] =
        [Action::Read, Action::Create, Action::Update, Action::Delete, Action::Publish, Action::Moderate, Action::Manage];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Content,
    Service,
    Directory,
    Community,
    User,
    System,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Content,
        ResourceKind::Service,
        ResourceKind::Directory,
        ResourceKind::Community,
        ResourceKind::User,
        ResourceKind::System,
    ];
}

/// Role-backed capabilities whose role names are not normalised upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ServiceOwner,
    ContentPublisher,
    Moderator,
    DirectoryMaintainer,
    SystemAdmin,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ServiceOwner,
        Capability::ContentPublisher,
        Capability::Moderator,
        Capability::DirectoryMaintainer,
        Capability::SystemAdmin,
    ];

    /// Suffix used by `PORTAL_ROLE_SYNONYMS_<NAME>` overrides.
    pub fn env_name(self) -> &'static str {
        match self {
            Capability::ServiceOwner => "SERVICE_OWNER",
            Capability::ContentPublisher => "CONTENT_PUBLISHER",
            Capability::Moderator => "MODERATOR",
            Capability::DirectoryMaintainer => "DIRECTORY_MAINTAINER",
            Capability::SystemAdmin => "SYSTEM_ADMIN",
        }
    }

    fn default_synonyms(self) -> &'static [&'static str] {
        match self {
            Capability::ServiceOwner => &["service_owner", "service_provider"],
            Capability::ContentPublisher => &["content_publisher", "publisher", "content_editor"],
            Capability::Moderator => &["moderator", "community_moderator"],
            Capability::DirectoryMaintainer => &["directory_maintainer", "directory_admin", "directory_editor"],
            Capability::SystemAdmin => &["system_admin", "admin", "super_admin", "platform_admin"],
        }
    }
}

/// Role-name synonym sets per capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleVocabulary {
    synonyms: HashMap<Capability, Vec<String>>,
}

impl Default for RoleVocabulary {
    fn default() -> Self {
        let synonyms = Capability::ALL
            .iter()
            .map(|c| (*c, c.default_synonyms().iter().map(|s| s.to_string()).collect()))
            .collect();
        Self { synonyms }
    }
}

impl RoleVocabulary {
    /// Replace the synonym set of one capability. Empty entries are dropped.
    pub fn set_synonyms<I, S>(&mut self, cap: Capability, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|s| normalize_role(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        self.synonyms.insert(cap, names);
    }

    pub fn synonyms(&self, cap: Capability) -> &[String] {
        self.synonyms.get(&cap).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Read-only allow set; anything absent is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbilityRuleSet {
    allowed: HashSet<(Action, ResourceKind)>,
}

impl AbilityRuleSet {
    pub fn allows(&self, action: Action, kind: ResourceKind) -> bool {
        self.allowed.contains(&(action, kind))
    }

    pub fn len(&self) -> usize { self.allowed.len() }

    pub fn is_empty(&self) -> bool { self.allowed.is_empty() }

    fn grant(&mut self, kind: ResourceKind, actions: &[Action]) {
        for a in actions {
            self.allowed.insert((*a, kind));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abilities {
    primary_role: Option<String>,
    roles: Vec<String>,
    segment: Segment,
    is_new_joiner: bool,
    is_employee: bool,
    is_service_owner: bool,
    is_content_publisher: bool,
    is_moderator: bool,
    is_directory_maintainer: bool,
    is_system_admin: bool,
    rules: AbilityRuleSet,
}

impl Abilities {
    pub fn resolve(ctx: &UserContext, vocab: &RoleVocabulary) -> Self {
        let roles: Vec<String> = ctx.roles.iter().map(|r| normalize_role(r)).filter(|r| !r.is_empty()).collect();
        let primary_role = ctx.primary_role().map(normalize_role);
        let has = |cap: Capability| vocab.synonyms(cap).iter().any(|s| roles.contains(s));

        let segment = ctx.segment.clone();
        let is_new_joiner = segment == Segment::NewJoiner;
        let is_employee = segment == Segment::Employee;
        let is_system_admin =
            has(Capability::SystemAdmin) || primary_role.as_deref() == Some("admin") || segment == Segment::PlatformAdmin;

        let is_service_owner = has(Capability::ServiceOwner);
        let is_content_publisher = has(Capability::ContentPublisher);
        let is_moderator = has(Capability::Moderator);
        let is_directory_maintainer = has(Capability::DirectoryMaintainer);

        let mut abilities = Self {
            is_service_owner,
            is_content_publisher,
            is_moderator,
            is_directory_maintainer,
            is_new_joiner,
            is_employee,
            is_system_admin,
            primary_role,
            roles,
            segment,
            rules: AbilityRuleSet::default(),
        };
        abilities.rules = abilities.build_rules();
        abilities
    }

    fn build_rules(&self) -> AbilityRuleSet {
        use Action::*;
        use ResourceKind::*;
        let mut rules = AbilityRuleSet::default();
        if self.is_system_admin {
            for kind in ResourceKind::ALL {
                rules.grant(kind, &Action::ALL);
            }
            return rules;
        }
        for kind in [Content, Service, Directory, Community] {
            rules.grant(kind, &[Read]);
        }
        if self.is_employee {
            rules.grant(Community, &[Create]);
        }
        if self.is_content_publisher {
            rules.grant(Content, &[Create, Update, Publish]);
        }
        if self.is_service_owner {
            rules.grant(Service, &[Create, Update]);
        }
        if self.is_moderator {
            rules.grant(Community, &[Moderate, Delete, Update]);
        }
        if self.is_directory_maintainer {
            rules.grant(Directory, &[Create, Update, Delete]);
        }
        rules
    }

    /// Primary role or any responsibility role equals `name`, case-insensitively.
    pub fn has_role(&self, name: &str) -> bool {
        let name = name.trim();
        self.primary_role.as_deref().is_some_and(|p| p.eq_ignore_ascii_case(name))
            || self.roles.iter().any(|r| r.eq_ignore_ascii_case(name))
    }

    pub fn has_any_role<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().any(|n| self.has_role(n.as_ref()))
    }

    pub fn can(&self, action: Action, kind: ResourceKind) -> bool { self.rules.allows(action, kind) }

    pub fn cannot(&self, action: Action, kind: ResourceKind) -> bool { !self.can(action, kind) }

    pub fn rules(&self) -> &AbilityRuleSet { &self.rules }

    pub fn segment(&self) -> &Segment { &self.segment }

    pub fn is_new_joiner(&self) -> bool { self.is_new_joiner }
    pub fn is_employee(&self) -> bool { self.is_employee }
    pub fn is_service_owner(&self) -> bool { self.is_service_owner }
    pub fn is_content_publisher(&self) -> bool { self.is_content_publisher }
    pub fn is_moderator(&self) -> bool { self.is_moderator }
    pub fn is_directory_maintainer(&self) -> bool { self.is_directory_maintainer }
    pub fn is_system_admin(&self) -> bool { self.is_system_admin }
}

#[cfg(test)]
#[path = "abilities_tests.rs"]
mod abilities_tests;
