//! Shared-credential authentication for report ingestion.
//!
//! Reporters authenticate with a single process-wide secret, configured at
//! startup and injected into the ingestion path (never read from ambient
//! global state, so tests can stub it and operators can rotate it).
//!
//! The credential travels either in the `X-Auth-Token` header or as a
//! `token` field inside the JSON body; the header wins when both are
//! present. Comparison is constant-time via [`subtle::ConstantTimeEq`].

use axum::http::HeaderMap;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Header carrying the shared credential.
pub const HEADER_AUTH_TOKEN: &str = "X-Auth-Token";

/// Errors that can occur while authenticating a report.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No credential was supplied in the header or body.
    #[error("missing credential")]
    MissingCredential,

    /// The supplied credential did not match the configured secret.
    #[error("invalid credential")]
    InvalidCredential,
}

/// Body shape used only to pull out an embedded `token` field.
///
/// Every other field is ignored here; payload validation happens after the
/// credential check has passed.
#[derive(Debug, Deserialize)]
struct TokenField {
    token: Option<String>,
}

/// Extracts the credential from the request, header first, then body.
///
/// Returns `None` when neither carries a non-empty token. A body that is
/// not valid JSON yields `None` as well; it will be rejected as
/// unauthorized before any schema validation runs.
#[must_use]
pub fn extract_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    if let Some(token) = headers
        .get(HEADER_AUTH_TOKEN)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    serde_json::from_slice::<TokenField>(body)
        .ok()
        .and_then(|f| f.token)
        .filter(|t| !t.is_empty())
}

/// Compares a provided credential against the configured secret in
/// constant time.
pub fn validate_token(provided: &str, expected: &str) -> Result<(), AuthError> {
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredential)
    }
}

/// Full ingestion credential check: extract, then compare.
///
/// This runs before any payload parsing so that malformed bodies from
/// unauthenticated callers never reach the schema validators.
pub fn authorize(headers: &HeaderMap, body: &[u8], expected: &str) -> Result<(), AuthError> {
    let token = extract_token(headers, body).ok_or(AuthError::MissingCredential)?;
    validate_token(&token, expected)
}
