use std::time::Duration;

/// Failures surfaced by `TokenProvider::request`.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("unauthenticated: no active account")]
    NoActiveAccount,
    #[error("token acquisition failed: {0}")]
    AcquisitionFailed(String),
    /// Re-authentication is needed; a sign-in redirect has been issued.
    #[error("authentication required")]
    AuthenticationRequired,
    /// Identified but not permitted. Never retried.
    #[error("forbidden")]
    Forbidden,
    #[error("request failed: {status} {reason}")]
    Failed { status: u16, reason: String },
    #[error("response body did not match the expected shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("expected a response body but none was returned")]
    EmptyBody,
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::AuthenticationRequired => Some(401),
            RequestError::Forbidden => Some(403),
            RequestError::Failed { status, .. } => Some(*status),
            _ => None,
        }
    }
}
