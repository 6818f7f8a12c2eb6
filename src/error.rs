//! Muninn error types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single field validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    // Request gating errors
    #[error("credential is required")]
    AuthenticationMissing,

    #[error("request validation failed")]
    ValidationFailed(Vec<FieldError>),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    // Classified provider errors
    #[error("provider authentication failed")]
    ProviderAuthFailed,

    #[error("provider rate limited, retry after {retry_after:?}")]
    ProviderRateLimited { retry_after: Option<Duration> },

    #[error("provider rejected request: {0}")]
    ProviderBadRequest(String),

    #[error("provider service error ({status}): {message}")]
    ProviderServiceError { status: u16, message: String },

    // Tool server errors
    #[error("tool server error ({status}): {detail}")]
    ToolServer { status: u16, detail: String },

    #[error("tool listing unavailable: {0}")]
    ToolListUnavailable(String),

    // Transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("stream error: {0}")]
    Stream(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("no provider configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Stable HTTP status for the user-visible response.
    ///
    /// Store outages never reach this mapping — the limiter and cache
    /// absorb them at the component boundary (fail-open).
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::AuthenticationMissing => 401,
            GatewayError::ValidationFailed(_) => 400,
            GatewayError::RateLimitExceeded { .. } => 429,
            GatewayError::ProviderAuthFailed => 502,
            GatewayError::ProviderRateLimited { .. } => 429,
            GatewayError::ProviderBadRequest(_) => 400,
            GatewayError::ProviderServiceError { .. } => 502,
            GatewayError::ToolServer { status, .. } => *status,
            GatewayError::ToolListUnavailable(_) => 502,
            GatewayError::Http(_) | GatewayError::Stream(_) => 502,
            GatewayError::Json(_) | GatewayError::InvalidInput(_) => 400,
            GatewayError::NoProvider | GatewayError::Configuration(_) => 500,
        }
    }
}

/// User-visible error shape: stable message, status code, timestamp.
///
/// Internal detail is only included in debug builds.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        let fields = match err {
            GatewayError::ValidationFailed(fields) => Some(fields.clone()),
            _ => None,
        };
        Self {
            message: err.to_string(),
            status_code: err.status_code(),
            timestamp: Utc::now(),
            fields,
            detail: if cfg!(debug_assertions) {
                Some(format!("{err:?}"))
            } else {
                None
            },
        }
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(GatewayError::AuthenticationMissing.status_code(), 401);
        assert_eq!(
            GatewayError::RateLimitExceeded {
                retry_after: Duration::from_secs(60)
            }
            .status_code(),
            429
        );
        assert_eq!(GatewayError::ProviderAuthFailed.status_code(), 502);
        assert_eq!(
            GatewayError::ProviderBadRequest("bad".into()).status_code(),
            400
        );
        assert_eq!(
            GatewayError::ToolServer {
                status: 404,
                detail: "no such tool".into()
            }
            .status_code(),
            404
        );
    }

    #[test]
    fn validation_errors_carry_fields() {
        let err = GatewayError::ValidationFailed(vec![FieldError::new("prompt", "required")]);
        let body = ErrorBody::from(&err);
        assert_eq!(body.status_code, 400);
        let fields = body.fields.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field, "prompt");
    }
}
