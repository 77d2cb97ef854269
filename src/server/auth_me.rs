//! `GET /auth/me`: turn a presented identity assertion into the canonical `UserContext`.

use std::panic::AssertUnwindSafe;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::FutureExt;
use tracing::{debug, error, warn, Instrument};

use super::user_store::{UserRecord, UserStore};
use super::AppState;
use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{bearer_token, decode_unverified, normalize_role, DecodedIdentityClaims, Segment, UserContext};

pub const LEGACY_USER_ID_HEADER: &str = "x-user-id";
pub const LEGACY_USER_EMAIL_HEADER: &str = "x-user-email";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identity fields recovered from the token or the legacy headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentedIdentity {
    pub user_id: Option<String>,
    pub email: Option<String>,
}

impl PresentedIdentity {
    fn from_claims(claims: &DecodedIdentityClaims) -> Self {
        Self {
            user_id: claims.resolved_subject().map(str::to_string),
            email: claims.resolved_email().map(str::to_string),
        }
    }

    fn from_legacy_headers(headers: &HeaderMap) -> Self {
        Self { user_id: header_str(headers, LEGACY_USER_ID_HEADER), email: header_str(headers, LEGACY_USER_EMAIL_HEADER) }
    }

    fn is_empty(&self) -> bool { self.user_id.is_none() && self.email.is_none() }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read identity from the bearer token, falling back to legacy headers only when
/// the token is absent or yields nothing. With a verifier configured, a token
/// that fails verification is rejected outright.
pub fn presented_identity(headers: &HeaderMap, config: &ServerConfig) -> AppResult<PresentedIdentity> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    let from_token = match token {
        Some(t) => match &config.verifier {
            Some(verifier) => match verifier.verify(t) {
                Ok(claims) => Some(PresentedIdentity::from_claims(&claims)),
                Err(e) => {
                    warn!(target: "portal::auth_me", "bearer token rejected: {e}");
                    return Err(AppError::no_identity());
                }
            },
            None => match decode_unverified(t) {
                Ok(claims) => Some(PresentedIdentity::from_claims(&claims)),
                Err(e) => {
                    debug!(target: "portal::auth_me", "bearer token not decodable, trying legacy headers: {e}");
                    None
                }
            },
        },
        None => None,
    };

    let identity = match from_token {
        Some(id) if !id.is_empty() => id,
        _ => PresentedIdentity::from_legacy_headers(headers),
    };
    if identity.is_empty() {
        return Err(AppError::no_identity());
    }
    Ok(identity)
}

/// Primary role (or the default) followed by every responsibility role, normalized.
pub fn aggregate_roles(record: &UserRecord, responsibility: &[String], default_role: &str) -> Vec<String> {
    let primary = record
        .primary_role
        .as_deref()
        .map(normalize_role)
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| normalize_role(default_role));
    std::iter::once(primary).chain(responsibility.iter().map(|r| normalize_role(r))).collect()
}

fn user_context_from(record: UserRecord, roles: Vec<String>) -> UserContext {
    let segment = record.segment.as_deref().map(Segment::parse).unwrap_or_default();
    let display_name = record
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| record.email.clone());
    UserContext {
        new_joiner: segment == Segment::NewJoiner,
        id: record.id,
        email: record.email,
        display_name,
        roles,
        segment,
        domain: record.domain,
    }
}

/// Full resolution: identity, domain gate, lookup, role aggregation.
pub async fn resolve_user_context(store: &dyn UserStore, config: &ServerConfig, headers: &HeaderMap) -> AppResult<UserContext> {
    let identity = presented_identity(headers, config)?;

    if let Some(email) = identity.email.as_deref() {
        if !config.email_domain_allowed(email) {
            warn!(target: "portal::auth_me", "rejecting external domain for {}", email);
            return Err(AppError::external_domain());
        }
    }

    let mut record = None;
    if let Some(id) = identity.user_id.as_deref() {
        record = store.find_by_id(id).await.map_err(|e| {
            error!(target: "portal::auth_me", "lookup by id failed: {e}");
            AppError::fetch_failed()
        })?;
    }
    if record.is_none() {
        if let Some(email) = identity.email.as_deref() {
            record = store.find_by_email(email).await.map_err(|e| {
                error!(target: "portal::auth_me", "lookup by email failed: {e}");
                AppError::fetch_failed()
            })?;
        }
    }
    let Some(record) = record else {
        debug!(target: "portal::auth_me", "no record for {:?}", identity);
        return Err(AppError::user_not_found());
    };

    let responsibility = store.responsibility_roles(&record.id).await.map_err(|e| {
        error!(target: "portal::auth_me", "responsibility role lookup failed for {}: {e}", record.id);
        AppError::fetch_failed()
    })?;
    let roles = aggregate_roles(&record, &responsibility, &config.default_role);
    Ok(user_context_from(record, roles))
}

pub async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = header_str(&headers, REQUEST_ID_HEADER).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let span = tracing::info_span!(target: "portal::auth_me", "auth_me", request_id = %request_id);

    let fut = async { resolve_user_context(state.store.as_ref(), &state.config, &headers).await }.instrument(span);
    let result = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(r) => r,
        Err(_) => {
            error!(target: "portal::auth_me", "resolver panicked (request_id={})", request_id);
            Err(AppError::fetch_failed())
        }
    };

    let mut response = match result {
        Ok(ctx) => Json(ctx).into_response(),
        Err(e) => e.into_response(),
    };
    if let Ok(v) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    response
}

pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed("method_not_allowed", crate::error::MSG_METHOD_NOT_ALLOWED)
}
