//! Navigation capability used by the cache guard and the token provider.
//! The host (browser shell, webview, headless client) implements `Navigator`;
//! `MemoryNavigator` records every side effect and is used by native clients and tests.

use parking_lot::Mutex;
use reqwest::Url;

/// Query/fragment parameters that mark an in-flight sign-in redirect.
pub const REDIRECT_PARAMS: &[&str] = &["code", "state"];

pub trait Navigator: Send + Sync {
    fn current_url(&self) -> Url;
    /// Rewrite the current history entry without navigating.
    fn replace_url(&self, url: &Url);
    /// Navigate to a new location (adds a history entry).
    fn assign(&self, url: &Url);
    /// Full reload. Ends the current execution context in a browser host.
    fn reload(&self);
}

/// True if the query string or the fragment carries an authorization code or state value.
pub fn has_redirect_params(url: &Url) -> bool {
    if url.query_pairs().any(|(k, _)| REDIRECT_PARAMS.contains(&k.as_ref())) {
        return true;
    }
    match url.fragment() {
        Some(frag) => {
            let frag = frag.trim_start_matches(['#', '?']);
            fragment_keys(frag).any(|k| REDIRECT_PARAMS.contains(&k))
        }
        None => false,
    }
}

/// Origin + path only: drops the query string and fragment.
pub fn strip_redirect_params(url: &Url) -> Url {
    let mut out = url.clone();
    out.set_query(None);
    out.set_fragment(None);
    out
}

/// Key names of an `a=b&c=d` fragment.
fn fragment_keys(s: &str) -> impl Iterator<Item = &str> {
    s.split('&')
        .filter(|p| !p.is_empty())
        .map(|p| p.split_once('=').map(|(k, _)| k).unwrap_or(p))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    Replace(String),
    Assign(String),
    Reload,
}

/// In-process navigator that keeps a current URL and an event log.
#[derive(Debug)]
pub struct MemoryNavigator {
    current: Mutex<Url>,
    events: Mutex<Vec<NavEvent>>,
}

impl MemoryNavigator {
    pub fn new(url: Url) -> Self {
        Self { current: Mutex::new(url), events: Mutex::new(Vec::new()) }
    }

    pub fn parse(url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn events(&self) -> Vec<NavEvent> { self.events.lock().clone() }

    pub fn reload_count(&self) -> usize {
        self.events.lock().iter().filter(|e| matches!(e, NavEvent::Reload)).count()
    }

    pub fn assign_count(&self) -> usize {
        self.events.lock().iter().filter(|e| matches!(e, NavEvent::Assign(_))).count()
    }
}

impl Navigator for MemoryNavigator {
    fn current_url(&self) -> Url { self.current.lock().clone() }

    fn replace_url(&self, url: &Url) {
        *self.current.lock() = url.clone();
        self.events.lock().push(NavEvent::Replace(url.to_string()));
    }

    fn assign(&self, url: &Url) {
        *self.current.lock() = url.clone();
        self.events.lock().push(NavEvent::Assign(url.to_string()));
    }

    fn reload(&self) {
        self.events.lock().push(NavEvent::Reload);
    }
}
