//! Unified application error model for the HTTP surface.
//! Handlers return `AppError`; the response body is always `{"error": "<message>"}`
//! and the status is derived from the variant.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const MSG_UNAUTHORIZED: &str = "Unauthorized - no valid identity provided";
pub const MSG_EXTERNAL_DOMAIN: &str = "Access denied - external email domain not allowed";
pub const MSG_USER_NOT_FOUND: &str = "User not found";
pub const MSG_METHOD_NOT_ALLOWED: &str = "Method not allowed";
pub const MSG_FETCH_FAILED: &str = "Failed to fetch user data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Unauthorized { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    MethodNotAllowed { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthorized { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::MethodNotAllowed { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthorized { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::MethodNotAllowed { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn unauthorized<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthorized { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn method_not_allowed<S: Into<String>>(code: S, msg: S) -> Self { AppError::MethodNotAllowed { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// No identity could be resolved from the token or the legacy headers.
    pub fn no_identity() -> Self { Self::unauthorized("unauthorized", MSG_UNAUTHORIZED) }

    /// Identity resolved but its email domain is outside the allow-list.
    pub fn external_domain() -> Self { Self::forbidden("external_domain", MSG_EXTERNAL_DOMAIN) }

    pub fn user_not_found() -> Self { Self::not_found("user_not_found", MSG_USER_NOT_FOUND) }

    /// Data-layer failures are never surfaced verbatim.
    pub fn fetch_failed() -> Self { Self::internal("fetch_failed", MSG_FETCH_FAILED) }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Unauthorized { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::MethodNotAllowed { .. } => 405,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({ "error": self.message() }))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(target: "portal::http", "internal error: {err:#}");
        AppError::fetch_failed()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
