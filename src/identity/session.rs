use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::abilities::{Abilities, RoleVocabulary};
use super::user_context::UserContext;

/// Signed-in account as reported by the identity library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub account_id: String,
    pub username: String,
}

/// In-memory bearer credential. Never persisted by this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub account_id: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    pub fn is_fresh(&self, skew: Duration) -> bool {
        let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
        self.expires_at - skew > Utc::now()
    }
}

/// The identity library, reduced to one capability: silently acquire a bearer
/// credential for an account, optionally bypassing anything it has cached.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire_silent(&self, account: &Account, scopes: &[String], force_refresh: bool) -> anyhow::Result<Credential>;
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("no active account")]
    NoActiveAccount,
    #[error("silent token acquisition failed: {0}")]
    Failed(String),
}

/// Context plus the abilities derived from it; replaced as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    pub context: UserContext,
    pub abilities: Abilities,
}

const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Holds the active account, its cached credential and the current user context.
/// Injected into the token provider; tests substitute the `TokenSource`.
pub struct SessionManager {
    source: Arc<dyn TokenSource>,
    vocabulary: RoleVocabulary,
    refresh_skew: Duration,
    account: RwLock<Option<Account>>,
    credentials: RwLock<HashMap<String, Credential>>,
    user: RwLock<Option<Arc<ResolvedUser>>>,
}

impl SessionManager {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self::with_vocabulary(source, RoleVocabulary::default())
    }

    pub fn with_vocabulary(source: Arc<dyn TokenSource>, vocabulary: RoleVocabulary) -> Self {
        Self {
            source,
            vocabulary,
            refresh_skew: DEFAULT_REFRESH_SKEW,
            account: RwLock::new(None),
            credentials: RwLock::new(HashMap::new()),
            user: RwLock::new(None),
        }
    }

    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    /// Switching to a different account drops the previous user context.
    pub fn set_active_account(&self, account: Account) {
        let mut current = self.account.write();
        let changed = current.as_ref().map(|a| a.account_id != account.account_id).unwrap_or(true);
        if changed {
            *self.user.write() = None;
            info!(target: "portal::session", "active account set: {}", account.account_id);
        }
        *current = Some(account);
    }

    pub fn active_account(&self) -> Option<Account> { self.account.read().clone() }

    /// Silent acquisition for the active account. A cached credential is reused
    /// while fresh unless `force_refresh` is set.
    pub async fn acquire_token(&self, scopes: &[String], force_refresh: bool) -> Result<Credential, AcquireError> {
        let account = self.active_account().ok_or(AcquireError::NoActiveAccount)?;
        if !force_refresh {
            if let Some(c) = self.credentials.read().get(&account.account_id) {
                if c.is_fresh(self.refresh_skew) {
                    return Ok(c.clone());
                }
            }
        }
        debug!(target: "portal::session", "acquiring token: account={} force_refresh={}", account.account_id, force_refresh);
        let credential = self
            .source
            .acquire_silent(&account, scopes, force_refresh)
            .await
            .map_err(|e| AcquireError::Failed(format!("{e:#}")))?;
        self.credentials.write().insert(account.account_id.clone(), credential.clone());
        Ok(credential)
    }

    /// Install a new user context; abilities are recomputed with it.
    pub fn set_user_context(&self, context: UserContext) -> Arc<ResolvedUser> {
        let abilities = Abilities::resolve(&context, &self.vocabulary);
        let resolved = Arc::new(ResolvedUser { context, abilities });
        *self.user.write() = Some(resolved.clone());
        resolved
    }

    pub fn current_user(&self) -> Option<Arc<ResolvedUser>> { self.user.read().clone() }

    pub fn user_context(&self) -> Option<UserContext> { self.current_user().map(|u| u.context.clone()) }

    pub fn abilities(&self) -> Option<Abilities> { self.current_user().map(|u| u.abilities.clone()) }

    /// Drop the account, every cached credential and the user context.
    pub fn sign_out(&self) {
        let prev = self.account.write().take();
        self.credentials.write().clear();
        *self.user.write() = None;
        info!(
            target: "portal::session",
            "signed out: account={}",
            prev.map(|a| a.account_id).unwrap_or_else(|| "<none>".to_string())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Segment;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        ttl_secs: i64,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn acquire_silent(&self, account: &Account, _scopes: &[String], force_refresh: bool) -> anyhow::Result<Credential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential {
                access_token: format!("tok-{n}-{force_refresh}"),
                account_id: account.account_id.clone(),
                expires_at: Utc::now() + chrono::Duration::seconds(self.ttl_secs),
            })
        }
    }

    fn manager(ttl_secs: i64) -> (Arc<CountingSource>, SessionManager) {
        let src = Arc::new(CountingSource { calls: AtomicUsize::new(0), ttl_secs });
        (src.clone(), SessionManager::new(src))
    }

    fn account() -> Account { Account { account_id: "acc-1".into(), username: "a@digitalqatalyst.com".into() } }

    fn context(segment: Segment) -> UserContext {
        UserContext {
            id: "u1".into(),
            email: "a@digitalqatalyst.com".into(),
            display_name: "A".into(),
            roles: vec!["user".into()],
            new_joiner: false,
            segment,
            domain: None,
        }
    }

    #[tokio::test]
    async fn no_account_fails_fast() {
        let (src, sm) = manager(3600);
        let err = sm.acquire_token(&[], false).await.unwrap_err();
        assert!(matches!(err, AcquireError::NoActiveAccount));
        assert_eq!(src.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_credential_is_reused_and_force_refresh_bypasses_it() {
        let (src, sm) = manager(3600);
        sm.set_active_account(account());
        let a = sm.acquire_token(&[], false).await.unwrap();
        let b = sm.acquire_token(&[], false).await.unwrap();
        assert_eq!(a, b);
        let c = sm.acquire_token(&[], true).await.unwrap();
        assert_eq!(c.access_token, "tok-2-true");
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn near_expiry_credential_is_reacquired() {
        let (src, sm) = manager(30);
        sm.set_active_account(account());
        sm.acquire_token(&[], false).await.unwrap();
        sm.acquire_token(&[], false).await.unwrap();
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn abilities_follow_context_changes() {
        let (_src, sm) = manager(3600);
        sm.set_active_account(account());
        sm.set_user_context(context(Segment::Employee));
        assert!(sm.abilities().unwrap().is_employee());
        sm.set_user_context(context(Segment::NewJoiner));
        let abilities = sm.abilities().unwrap();
        assert!(abilities.is_new_joiner());
        assert!(!abilities.is_employee());
    }

    #[tokio::test]
    async fn sign_out_destroys_everything() {
        let (src, sm) = manager(3600);
        sm.set_active_account(account());
        sm.acquire_token(&[], false).await.unwrap();
        sm.set_user_context(context(Segment::Employee));
        sm.sign_out();
        assert!(sm.active_account().is_none());
        assert!(sm.user_context().is_none());
        sm.set_active_account(account());
        sm.acquire_token(&[], false).await.unwrap();
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn switching_account_drops_user_context() {
        let (_src, sm) = manager(3600);
        sm.set_active_account(account());
        sm.set_user_context(context(Segment::Employee));
        sm.set_active_account(account());
        assert!(sm.user_context().is_some());
        sm.set_active_account(Account { account_id: "acc-2".into(), username: "b@digitalqatalyst.com".into() });
        assert!(sm.user_context().is_none());
    }

    #[test]
    fn credential_debug_redacts_token() {
        let c = Credential { access_token: "secret".into(), account_id: "a".into(), expires_at: Utc::now() };
        assert!(!format!("{c:?}").contains("secret"));
    }
}
