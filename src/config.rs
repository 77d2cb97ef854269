//! Runtime configuration for the client core and the `/auth/me` server.
//! Values come from `PORTAL_*` environment variables layered over defaults;
//! unparseable values fall back to the default with a warning.

use std::time::Duration;

use reqwest::Url;
use tracing::warn;

use crate::cache_guard::IDENTITY_CACHE_SCHEMA_VERSION;
use crate::identity::{Capability, RoleVocabulary, TokenVerifier};

pub const DEFAULT_HTTP_PORT: u16 = 7979;
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:7979/";
pub const DEFAULT_SIGN_IN_PATH: &str = "/login";
pub const DEFAULT_ROLE: &str = "user";
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["@digitalqatalyst.com"];
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email"];
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env_opt(name).map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env_opt(name) {
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            warn!(target: "portal::config", "ignoring unparseable {}={:?}", name, raw);
            default
        }),
        None => default,
    }
}

/// Settings for the token provider and the cache guard.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub sign_in_path: String,
    pub scopes: Vec<String>,
    pub request_timeout: Duration,
    pub identity_cache_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            identity_cache_version: IDENTITY_CACHE_SCHEMA_VERSION.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(raw) = env_opt("PORTAL_API_BASE_URL") {
            match Url::parse(&raw) {
                Ok(url) => cfg.api_base_url = url.to_string(),
                Err(e) => warn!(target: "portal::config", "ignoring PORTAL_API_BASE_URL={:?}: {}", raw, e),
            }
        }
        if let Some(path) = env_opt("PORTAL_SIGN_IN_PATH") {
            cfg.sign_in_path = path;
        }
        if let Some(scopes) = env_list("PORTAL_TOKEN_SCOPES") {
            cfg.scopes = scopes;
        }
        cfg.request_timeout = Duration::from_secs(env_parse("PORTAL_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT.as_secs()));
        if let Some(v) = env_opt("PORTAL_IDENTITY_CACHE_VERSION") {
            cfg.identity_cache_version = v;
        }
        cfg
    }
}

/// Settings for the `/auth/me` resolver and its HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    /// Suffixes such as `@digitalqatalyst.com`; matched case-insensitively.
    pub allowed_domains: Vec<String>,
    pub default_role: String,
    pub verifier: Option<TokenVerifier>,
    pub users_file: Option<String>,
    pub vocabulary: RoleVocabulary,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            allowed_domains: normalize_domains(DEFAULT_ALLOWED_DOMAINS),
            default_role: DEFAULT_ROLE.to_string(),
            verifier: None,
            users_file: None,
            vocabulary: RoleVocabulary::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.http_port = env_parse("PORTAL_HTTP_PORT", DEFAULT_HTTP_PORT);
        if let Some(domains) = env_list("PORTAL_ALLOWED_DOMAINS") {
            cfg.allowed_domains = normalize_domains(domains.as_slice());
        }
        if let Some(role) = env_opt("PORTAL_DEFAULT_ROLE") {
            cfg.default_role = role;
        }
        if let Some(secret) = env_opt("PORTAL_JWT_HS256_SECRET") {
            let audience = env_opt("PORTAL_JWT_AUDIENCE");
            cfg.verifier = Some(TokenVerifier::hs256(secret.as_bytes(), audience.as_deref()));
        }
        cfg.users_file = env_opt("PORTAL_USERS_FILE");
        for cap in Capability::ALL {
            if let Some(names) = env_list(&format!("PORTAL_ROLE_SYNONYMS_{}", cap.env_name())) {
                cfg.vocabulary.set_synonyms(cap, names);
            }
        }
        cfg
    }

    pub fn with_allowed_domains<S: AsRef<str>>(mut self, domains: &[S]) -> Self {
        self.allowed_domains = normalize_domains(domains);
        self
    }

    pub fn with_verifier(mut self, verifier: TokenVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Case-insensitive suffix match against the allow-list.
    pub fn email_domain_allowed(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        self.allowed_domains.iter().any(|d| email.ends_with(d.as_str()))
    }
}

/// Lowercase and anchor each entry on `@` so `evil-example.com` never matches `example.com`.
fn normalize_domains<S: AsRef<str>>(domains: &[S]) -> Vec<String> {
    domains
        .iter()
        .map(|d| d.as_ref().trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .map(|d| if d.starts_with('@') { d } else { format!("@{d}") })
        .collect()
}
