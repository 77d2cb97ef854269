#![allow(dead_code)]
//! Shared helpers for the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

use portal_session::server::user_store::{InMemoryUserStore, StoreError, UserRecord, UserStore};

/// Structurally valid, unsigned three-part token carrying `claims`.
pub fn unsigned_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{header}.{payload}.sig")
}

pub async fn read_json(resp: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The scenario user: `u1`, primary role `editor`, one responsibility role `reviewer`.
pub fn seeded_store() -> InMemoryUserStore {
    let store = InMemoryUserStore::new();
    store.insert_user(UserRecord {
        id: "u1".into(),
        email: "a@digitalqatalyst.com".into(),
        display_name: Some("Ada".into()),
        primary_role: Some("editor".into()),
        segment: Some("employee".into()),
        domain: Some("engineering".into()),
    });
    store.add_responsibility_role("u1", "reviewer");
    store
}

/// Wraps a store and counts every lookup; optionally fails all of them.
pub struct CountingStore {
    inner: InMemoryUserStore,
    pub lookups: AtomicUsize,
    fail: bool,
}

impl CountingStore {
    pub fn new(inner: InMemoryUserStore) -> Arc<Self> {
        Arc::new(Self { inner, lookups: AtomicUsize::new(0), fail: false })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { inner: InMemoryUserStore::new(), lookups: AtomicUsize::new(0), fail: true })
    }

    pub fn lookups(&self) -> usize { self.lookups.load(Ordering::SeqCst) }

    fn touch(&self) -> Result<(), StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError::Unavailable("connection refused (db.internal:5432)".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for CountingStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.touch()?;
        self.inner.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.touch()?;
        self.inner.find_by_email(email).await
    }

    async fn responsibility_roles(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.touch()?;
        self.inner.responsibility_roles(user_id).await
    }
}
