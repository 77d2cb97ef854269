//! Boot-time integrity guard for the identity-provider token cache.
//!
//! Runs once, before any identity-library code, and decides whether boot may
//! continue. A stale or corrupted cache is wiped; when that happens in the middle
//! of a sign-in redirect the redirect parameters are stripped and the page is
//! reloaded, because the pending authorization code can no longer be redeemed
//! against the emptied cache.
//!
//! Failures inside the guard never block boot: they are logged and the guard
//! reports `Continue`.

mod keys;
mod storage;

pub use keys::{
    looks_json_shaped, looks_like_identity_library_key, StoreScope, CACHE_CLEARED_FLAG_KEY, CACHE_VERSION_KEY,
    IDENTITY_CACHE_SCHEMA_VERSION,
};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::{error, info, warn};

use crate::navigation::{has_redirect_params, strip_redirect_params, Navigator};

/// Whether the caller may continue initialising this tick.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    Continue,
    /// A full reload was requested; nothing else may run in this execution context.
    Reloading,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearReason {
    VersionStale { found: Option<String> },
    Corrupted { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardReport {
    pub outcome: BootOutcome,
    pub cleared: Option<ClearReason>,
    pub removed_keys: usize,
}

impl GuardReport {
    fn unchanged(outcome: BootOutcome) -> Self { Self { outcome, cleared: None, removed_keys: 0 } }
}

pub struct CacheGuard {
    persistent: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    expected_version: String,
}

impl CacheGuard {
    pub fn new(
        persistent: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
        expected_version: impl Into<String>,
    ) -> Self {
        Self { persistent, session, navigator, expected_version: expected_version.into() }
    }

    /// Run the guard once. Never fails: internal errors and panics fail open.
    pub fn run(&self) -> GuardReport {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.try_run())) {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(target: "portal::cache_guard", "cache guard failed, continuing boot: {e:#}");
                GuardReport::unchanged(BootOutcome::Continue)
            }
            Err(_) => {
                error!(target: "portal::cache_guard", "cache guard panicked, continuing boot");
                GuardReport::unchanged(BootOutcome::Continue)
            }
        }
    }

    fn try_run(&self) -> Result<GuardReport> {
        let url = self.navigator.current_url();
        let redirect_pending = has_redirect_params(&url);

        // One-shot flag left by a previous clear: consume it, and if the stale
        // code is still in the URL break the loop with another strip + reload.
        if self.session.get(CACHE_CLEARED_FLAG_KEY)?.is_some() {
            self.session.remove(CACHE_CLEARED_FLAG_KEY)?;
            if redirect_pending {
                info!(target: "portal::cache_guard", "redirect parameters survived a cache clear; stripping and reloading");
                self.strip_and_reload(&url);
                return Ok(GuardReport::unchanged(BootOutcome::Reloading));
            }
        }

        let reason = match self.version_mismatch()? {
            Some(r) => Some(r),
            None => self.find_corrupted_key()?.map(|key| ClearReason::Corrupted { key }),
        };
        let Some(reason) = reason else {
            return Ok(GuardReport::unchanged(BootOutcome::Continue));
        };

        let removed_keys = self.clear_identity_keys()?;
        self.persistent.set(CACHE_VERSION_KEY, &self.expected_version)?;
        info!(
            target: "portal::cache_guard",
            "cleared identity cache: reason={:?} removed_keys={} version={}",
            reason, removed_keys, self.expected_version
        );

        if redirect_pending {
            self.session.set(CACHE_CLEARED_FLAG_KEY, "true")?;
            self.strip_and_reload(&url);
            return Ok(GuardReport { outcome: BootOutcome::Reloading, cleared: Some(reason), removed_keys });
        }
        Ok(GuardReport { outcome: BootOutcome::Continue, cleared: Some(reason), removed_keys })
    }

    fn version_mismatch(&self) -> Result<Option<ClearReason>> {
        let found = self.persistent.get(CACHE_VERSION_KEY)?;
        if found.as_deref() == Some(self.expected_version.as_str()) {
            return Ok(None);
        }
        Ok(Some(ClearReason::VersionStale { found }))
    }

    fn find_corrupted_key(&self) -> Result<Option<String>> {
        for key in self.persistent.keys()? {
            if !looks_like_identity_library_key(&key, StoreScope::Persistent) {
                continue;
            }
            let Some(value) = self.persistent.get(&key)? else { continue };
            if looks_json_shaped(&value) && serde_json::from_str::<serde_json::Value>(&value).is_err() {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    fn clear_identity_keys(&self) -> Result<usize> {
        let mut removed = 0usize;
        for (store, scope) in [(&self.persistent, StoreScope::Persistent), (&self.session, StoreScope::Session)] {
            for key in store.keys()? {
                if looks_like_identity_library_key(&key, scope) {
                    store.remove(&key)?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn strip_and_reload(&self, url: &reqwest::Url) {
        let clean = strip_redirect_params(url);
        self.navigator.replace_url(&clean);
        self.navigator.reload();
    }
}

/// Explicit boot entry point. The guard runs on the first call only; later calls
/// return the memoised outcome.
pub struct SessionBootstrap {
    guard: CacheGuard,
    outcome: OnceCell<BootOutcome>,
}

impl SessionBootstrap {
    pub fn new(guard: CacheGuard) -> Self { Self { guard, outcome: OnceCell::new() } }

    pub fn initialize_session(&self) -> BootOutcome {
        *self.outcome.get_or_init(|| self.guard.run().outcome)
    }
}
