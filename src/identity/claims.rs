//! Bearer token claim extraction.
//!
//! `decode_unverified` is a structural decode only (split the three-part token,
//! base64url-decode the payload, parse JSON). `TokenVerifier` adds signature,
//! expiry and audience checks and must be configured in production deployments.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    #[error("token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not a claims object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token failed verification: {0}")]
    Verification(String),
}

/// Identity claims this crate reads from a bearer token. Every field is optional;
/// resolution goes through the priority-ordered accessors below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecodedIdentityClaims {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub upn: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default, rename = "localAccountId", alias = "local_account_id")]
    pub local_account_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

fn first_present<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| (*c).as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
}

impl DecodedIdentityClaims {
    /// `email`, then `preferred_username`, then `upn`.
    pub fn resolved_email(&self) -> Option<&str> {
        first_present(&[&self.email, &self.preferred_username, &self.upn])
    }

    /// `sub`, then `oid`, then the provider's local account id.
    pub fn resolved_subject(&self) -> Option<&str> {
        first_present(&[&self.sub, &self.oid, &self.local_account_id])
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, rest) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

/// Structural decode without signature verification.
pub fn decode_unverified(token: &str) -> Result<DecodedIdentityClaims, ClaimsError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return Err(ClaimsError::Malformed("expected three dot-separated segments"));
    };
    if payload.is_empty() {
        return Err(ClaimsError::Malformed("empty payload segment"));
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Signature verification for bearer tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").field("algorithms", &self.validation.algorithms).finish()
    }
}

impl TokenVerifier {
    /// HS256 shared-secret verification; `exp` is required. The audience is
    /// checked only when one is given.
    pub fn hs256(secret: &[u8], audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self { key: DecodingKey::from_secret(secret), validation }
    }

    pub fn verify(&self, token: &str) -> Result<DecodedIdentityClaims, ClaimsError> {
        jsonwebtoken::decode::<DecodedIdentityClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| ClaimsError::Verification(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsigned(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.sig")
    }

    #[test]
    fn email_priority_order() {
        let c = decode_unverified(&unsigned(serde_json::json!({
            "preferred_username": "p@digitalqatalyst.com",
            "upn": "u@digitalqatalyst.com"
        })))
        .unwrap();
        assert_eq!(c.resolved_email(), Some("p@digitalqatalyst.com"));

        let c = DecodedIdentityClaims { email: Some("  ".into()), upn: Some("u@x.com".into()), ..Default::default() };
        assert_eq!(c.resolved_email(), Some("u@x.com"));
    }

    #[test]
    fn subject_priority_order() {
        let c = decode_unverified(&unsigned(serde_json::json!({"oid": "o-1", "localAccountId": "l-1"}))).unwrap();
        assert_eq!(c.resolved_subject(), Some("o-1"));
        let c = decode_unverified(&unsigned(serde_json::json!({"localAccountId": "l-1"}))).unwrap();
        assert_eq!(c.resolved_subject(), Some("l-1"));
        assert_eq!(DecodedIdentityClaims::default().resolved_subject(), None);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(matches!(decode_unverified("abc"), Err(ClaimsError::Malformed(_))));
        assert!(matches!(decode_unverified("a.b.c.d"), Err(ClaimsError::Malformed(_))));
        assert!(matches!(decode_unverified("a.!!!.c"), Err(ClaimsError::Base64(_))));
        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("hello"));
        assert!(matches!(decode_unverified(&not_json), Err(ClaimsError::Json(_))));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer   tok "), Some("tok"));
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }

    #[test]
    fn verifier_accepts_signed_and_rejects_tampered() {
        use jsonwebtoken::{encode, EncodingKey, Header};
        let exp = chrono::Utc::now().timestamp() + 600;
        let claims = serde_json::json!({"email": "a@digitalqatalyst.com", "sub": "u1", "exp": exp});
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"s3cret")).unwrap();

        let verifier = TokenVerifier::hs256(b"s3cret", None);
        assert_eq!(verifier.verify(&token).unwrap().resolved_subject(), Some("u1"));

        let other = TokenVerifier::hs256(b"different", None);
        assert!(matches!(other.verify(&token), Err(ClaimsError::Verification(_))));
    }
}
