//! Canonical user records backing `/auth/me`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// One application user row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    #[serde(default, alias = "displayName", alias = "name")]
    pub display_name: Option<String>,
    #[serde(default, alias = "dws_role", alias = "role")]
    pub primary_role: Option<String>,
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Lookup seam between the resolver and whatever holds user data.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    /// Additional role grants for a user, in storage order.
    async fn responsibility_roles(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Deserialize)]
struct ResponsibilityRow {
    user_id: String,
    role: String,
}

#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    responsibility_roles: Vec<ResponsibilityRow>,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserRecord>,
    roles: HashMap<String, Vec<String>>,
}

/// Process-local store; rows are kept in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Tables>,
}

impl InMemoryUserStore {
    pub fn new() -> Self { Self::default() }

    /// Load `{"users": [...], "responsibility_roles": [{"user_id", "role"}]}`.
    pub fn load_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading users file {}", path.display()))?;
        let seed: SeedFile = serde_json::from_str(&raw).with_context(|| format!("parsing users file {}", path.display()))?;
        let store = Self::new();
        for u in seed.users {
            store.insert_user(u);
        }
        for row in seed.responsibility_roles {
            store.add_responsibility_role(&row.user_id, &row.role);
        }
        Ok(store)
    }

    /// Insert or replace by id.
    pub fn insert_user(&self, user: UserRecord) {
        let mut t = self.inner.write();
        match t.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => t.users.push(user),
        }
    }

    pub fn add_responsibility_role(&self, user_id: &str, role: &str) {
        self.inner.write().roles.entry(user_id.to_string()).or_default().push(role.to_string());
    }

    pub fn len(&self) -> usize { self.inner.read().users.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.inner.read().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.inner.read().users.iter().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn responsibility_roles(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.read().roles.get(user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn lookup_by_id_and_case_insensitive_email() {
        let s = InMemoryUserStore::new();
        s.insert_user(UserRecord { id: "u1".into(), email: "A@digitalqatalyst.com".into(), ..Default::default() });
        assert!(s.find_by_id("u1").await.unwrap().is_some());
        assert!(s.find_by_id("u2").await.unwrap().is_none());
        assert_eq!(s.find_by_email("a@DIGITALQATALYST.com").await.unwrap().unwrap().id, "u1");
    }

    #[tokio::test]
    async fn responsibility_roles_keep_order_and_duplicates() {
        let s = InMemoryUserStore::new();
        s.add_responsibility_role("u1", "reviewer");
        s.add_responsibility_role("u1", "editor");
        s.add_responsibility_role("u1", "reviewer");
        assert_eq!(s.responsibility_roles("u1").await.unwrap(), vec!["reviewer", "editor", "reviewer"]);
        assert!(s.responsibility_roles("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seed_file_accepts_dws_role_alias() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"users":[{{"id":"u1","email":"a@digitalqatalyst.com","dws_role":"editor","segment":"employee"}}],
                "responsibility_roles":[{{"user_id":"u1","role":"reviewer"}}]}}"#
        )
        .unwrap();
        let s = InMemoryUserStore::load_json_file(f.path()).unwrap();
        assert_eq!(s.len(), 1);
        let u = s.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(u.primary_role.as_deref(), Some("editor"));
        assert_eq!(s.responsibility_roles("u1").await.unwrap(), vec!["reviewer"]);
    }

    #[test]
    fn missing_seed_file_reports_path() {
        let err = InMemoryUserStore::load_json_file("/definitely/not/here.json").unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.json"));
    }
}
