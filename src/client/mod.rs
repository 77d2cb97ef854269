//! Bearer token provider wrapping every authenticated call to the portal backend.
//!
//! Each call acquires a credential silently, attaches it, and on a 401 performs
//! exactly one forced refresh followed by exactly one retried request. If that
//! still fails the browser is sent to the sign-in surface (unless already there)
//! and `AuthenticationRequired` is returned. Calls are independent: there is no
//! shared in-flight de-duplication.

mod abort;
mod error;

pub use abort::{AbortController, AbortSignal};
pub use error::RequestError;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::identity::{AcquireError, ResolvedUser, SessionManager, UserContext};
use crate::navigation::Navigator;

pub const AUTH_ME_ENDPOINT: &str = "auth/me";

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    pub require_auth: bool,
    pub signal: Option<AbortSignal>,
    /// Overrides the provider-wide timeout for this call.
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { method: Method::GET, headers: HeaderMap::new(), body: None, require_auth: true, signal: None, timeout: None }
    }
}

impl RequestOptions {
    pub fn get() -> Self { Self::default() }

    pub fn post(body: serde_json::Value) -> Self {
        Self { method: Method::POST, body: Some(body), ..Self::default() }
    }

    pub fn without_auth(mut self) -> Self {
        self.require_auth = false;
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    fn is_cancelled(&self) -> bool { self.signal.as_ref().is_some_and(AbortSignal::is_aborted) }
}

struct Fetched {
    status: StatusCode,
    body: Vec<u8>,
}

pub struct TokenProvider {
    http: reqwest::Client,
    base: Url,
    session: Arc<SessionManager>,
    navigator: Arc<dyn Navigator>,
    scopes: Vec<String>,
    sign_in_path: String,
    timeout: Duration,
}

impl TokenProvider {
    pub fn new(config: &ClientConfig, session: Arc<SessionManager>, navigator: Arc<dyn Navigator>) -> anyhow::Result<Self> {
        let mut base = Url::parse(&config.api_base_url).with_context(|| format!("invalid api base url {:?}", config.api_base_url))?;
        // Endpoints are joined relative to the base path.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder().build().context("building http client")?;
        Ok(Self {
            http,
            base,
            session,
            navigator,
            scopes: config.scopes.clone(),
            sign_in_path: normalize_sign_in_path(&config.sign_in_path),
            timeout: config.request_timeout,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> { &self.session }

    /// Issue a request to `endpoint` (relative to the API base URL).
    /// Returns `None` for a successful empty body.
    pub async fn request<T: DeserializeOwned>(&self, endpoint: &str, opts: RequestOptions) -> Result<Option<T>, RequestError> {
        if opts.is_cancelled() {
            return Err(RequestError::Cancelled);
        }
        let url = self
            .base
            .join(endpoint.trim_start_matches('/'))
            .map_err(|_| RequestError::InvalidEndpoint(endpoint.to_string()))?;
        // Credentials only ever go to the configured backend.
        if url.origin() != self.base.origin() || !url.as_str().starts_with(self.base.as_str()) {
            warn!(target: "portal::client", "refusing endpoint outside the api base: {:?}", endpoint);
            return Err(RequestError::InvalidEndpoint(endpoint.to_string()));
        }

        let token = if opts.require_auth {
            if self.session.active_account().is_none() {
                return Err(RequestError::NoActiveAccount);
            }
            Some(self.acquire(false).await?)
        } else {
            None
        };

        let mut fetched = self.send(&url, &opts, token.as_deref()).await?;

        if fetched.status == StatusCode::UNAUTHORIZED && opts.require_auth {
            if opts.is_cancelled() {
                return Err(RequestError::Cancelled);
            }
            debug!(target: "portal::client", "401 from {}; forcing token refresh", url.path());
            let refreshed = match self.acquire(true).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(target: "portal::client", "forced refresh failed after 401: {e}");
                    self.redirect_to_sign_in();
                    return Err(RequestError::AuthenticationRequired);
                }
            };
            fetched = self.send(&url, &opts, Some(&refreshed)).await?;
            if fetched.status == StatusCode::UNAUTHORIZED {
                warn!(target: "portal::client", "retry after refresh still unauthorized: {}", url.path());
                self.redirect_to_sign_in();
                return Err(RequestError::AuthenticationRequired);
            }
        }

        if fetched.status == StatusCode::FORBIDDEN {
            return Err(RequestError::Forbidden);
        }
        if !fetched.status.is_success() {
            return Err(RequestError::Failed {
                status: fetched.status.as_u16(),
                reason: fetched.status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        if fetched.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fetched.body)?))
    }

    /// Fetch `/auth/me` and install the result (with recomputed abilities) into the session.
    pub async fn load_user_context(&self) -> Result<Arc<ResolvedUser>, RequestError> {
        let ctx: UserContext = self.request(AUTH_ME_ENDPOINT, RequestOptions::get()).await?.ok_or(RequestError::EmptyBody)?;
        Ok(self.session.set_user_context(ctx))
    }

    async fn acquire(&self, force_refresh: bool) -> Result<String, RequestError> {
        let acquired = tokio::time::timeout(self.timeout, self.session.acquire_token(&self.scopes, force_refresh)).await;
        match acquired {
            Ok(Ok(c)) => Ok(c.access_token),
            Ok(Err(AcquireError::NoActiveAccount)) => Err(RequestError::NoActiveAccount),
            Ok(Err(AcquireError::Failed(msg))) => Err(RequestError::AcquisitionFailed(msg)),
            Err(_) => Err(RequestError::AcquisitionFailed(format!("timed out after {:?}", self.timeout))),
        }
    }

    async fn send(&self, url: &Url, opts: &RequestOptions, token: Option<&str>) -> Result<Fetched, RequestError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in opts.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(t) = token {
            let value = HeaderValue::from_str(&format!("Bearer {t}"))
                .map_err(|_| RequestError::AcquisitionFailed("credential is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        let mut builder = self.http.request(opts.method.clone(), url.clone()).headers(headers);
        if let Some(body) = &opts.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let timeout = opts.timeout.unwrap_or(self.timeout);
        let exchange = async {
            let resp = builder.send().await?;
            let status = resp.status();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>(Fetched { status, body: body.to_vec() })
        };
        let bounded = tokio::time::timeout(timeout, exchange);
        let outcome = match &opts.signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.aborted() => return Err(RequestError::Cancelled),
                r = bounded => r,
            },
            None => bounded.await,
        };
        match outcome {
            Ok(Ok(f)) => {
                debug!(target: "portal::client", "{} {} -> {}", opts.method, url.path(), f.status);
                Ok(f)
            }
            Ok(Err(e)) => Err(RequestError::Transport(e)),
            Err(_) => Err(RequestError::Timeout(timeout)),
        }
    }

    fn redirect_to_sign_in(&self) {
        let current = self.navigator.current_url();
        if normalize_sign_in_path(current.path()) == self.sign_in_path {
            debug!(target: "portal::client", "already on sign-in surface; not redirecting");
            return;
        }
        let mut target = current;
        target.set_path(&self.sign_in_path);
        target.set_query(None);
        target.set_fragment(None);
        self.navigator.assign(&target);
    }
}

/// Leading `/`, no trailing `/` (except for the root itself).
fn normalize_sign_in_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    format!("/{trimmed}")
}
