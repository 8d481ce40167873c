//! Error types for the Presence server.
//!
//! The service-level taxonomy is small and fixed:
//!
//! - [`ApiError::Unauthorized`] - bad or missing shared credential (401)
//! - [`ApiError::MalformedPayload`] - schema violation, message names the
//!   offending field (400)
//! - [`ApiError::StorageUnavailable`] - backing store unreachable or the
//!   write failed; safe for the caller to retry (500)
//! - [`ApiError::ChannelUnknown`] - internal misconfiguration, not
//!   user-triggerable in normal operation (500)
//!
//! Gateways catch only backing-store errors and map them into this taxonomy;
//! no error is silently swallowed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Top-level error type for request handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The shared credential was missing or did not match.
    #[error("unauthorized")]
    Unauthorized,

    /// The payload violated the target channel's schema.
    ///
    /// The message names the offending field so reporters can fix their
    /// payloads without guesswork.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The channel store could not complete the operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A request addressed a channel the store is not provisioned for.
    #[error("unknown channel: {0}")]
    ChannelUnknown(String),
}

impl ApiError {
    /// Creates a malformed-payload error naming the offending field.
    pub fn malformed(field: impl Into<String>) -> Self {
        Self::MalformedPayload(field.into())
    }

    /// The stable machine-readable code included in error responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::ChannelUnknown(_) => "channel_unknown",
        }
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::StorageUnavailable(_) | Self::ChannelUnknown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns `true` if this error indicates a client-side problem.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::MalformedPayload(_))
    }

    /// Returns `true` if the caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<AuthError> for ApiError {
    fn from(_: AuthError) -> Self {
        Self::Unauthorized
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownChannel(channel) => Self::ChannelUnknown(channel),
            StoreError::Unavailable(message) | StoreError::Corrupt(message) => {
                Self::StorageUnavailable(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new(self.to_string()).with_code(self.code());
        (self.status(), Json(body)).into_response()
    }
}

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// A specialized Result type for request handling.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
