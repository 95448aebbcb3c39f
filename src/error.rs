//! Crate-wide error taxonomy.
//!
//! Every error surfaced across cache, connection-manager, backtest, and
//! validation code collapses into [`ChronoError`] so HTTP handlers have a
//! single, consistent mapping to status codes (`spec.md` §6/§7).

use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed or semantically invalid request body.
    InvalidRequest,
    /// Backtest configuration violates an invariant (`spec.md` §4.8).
    InvalidConfig,
    /// No bars fall within the requested date range.
    NoDataInRange,
    /// Requested symbol/order/session does not exist.
    NotFound,
    /// Remote cache or warming data source is unreachable.
    Unavailable,
    /// An internal invariant was violated.
    Internal,
}

impl ErrorCode {
    /// HTTP status this error code maps to (`spec.md` §6).
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest | Self::InvalidConfig => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::NoDataInRange => StatusCode::NOT_FOUND,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable string form, used both in logs and in HTTP bodies.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::NoDataInRange => "NO_DATA_IN_RANGE",
            Self::NotFound => "NOT_FOUND",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// A structured error with machine-readable context.
#[derive(Debug, Error)]
pub struct ChronoError {
    code: ErrorCode,
    message: String,
    context: Vec<(String, String)>,
}

impl ChronoError {
    /// Build a new error of the given code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Attach a key/value of context (e.g. the offending field).
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// This error's code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Convenience constructor for invalid-request errors.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Convenience constructor for invalid grid-config errors, tagging the
    /// offending field (`spec.md` §4.8 Failures).
    #[must_use]
    pub fn invalid_config(field: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message).with_context("field", field)
    }

    /// No bars fell within the requested range.
    #[must_use]
    pub fn no_data_in_range() -> Self {
        Self::new(ErrorCode::NoDataInRange, "no bars in requested date range")
    }

    /// Not-found convenience constructor.
    #[must_use]
    pub fn not_found(what: &str, id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{what} '{id}' not found"))
            .with_context("id", id)
    }

    /// Backend/service unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// Unreachable internal state.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl std::fmt::Display for ChronoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.reason(), self.message)
    }
}

/// Wire-format error body returned by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code string.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Additional context (field name, id, etc).
    pub details: HashMap<String, String>,
}

impl From<&ChronoError> for ErrorResponse {
    fn from(err: &ChronoError) -> Self {
        Self {
            code: err.code.reason().to_string(),
            message: err.message.clone(),
            details: err.context.iter().cloned().collect(),
        }
    }
}

impl IntoResponse for ChronoError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let body = ErrorResponse::from(&self);
        (status, Json(body)).into_response()
    }
}

/// Convenience alias used throughout the crate.
pub type ChronoResult<T> = Result<T, ChronoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::InvalidConfig.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::Unavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::Internal.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn context_roundtrip() {
        let err = ChronoError::invalid_config("grid_count", "must be >= 1");
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
        let resp = ErrorResponse::from(&err);
        assert_eq!(resp.details.get("field").map(String::as_str), Some("grid_count"));
    }

    #[test]
    fn display_format() {
        let err = ChronoError::not_found("symbol", "AAPL");
        assert_eq!(err.to_string(), "[NOT_FOUND] symbol 'AAPL' not found");
    }
}
