//! API error types.

use axum::http::StatusCode;
use plughost_core::BackendError;
use std::time::Duration;
use thiserror::Error;

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Every failure the HTTP surface can report.
///
/// The display text is exactly the message placed in the `errors` array.
#[derive(Debug, Error)]
pub enum ApiError {
    // 400 Bad Request
    #[error("{0}")]
    BadRequest(String),

    // 403 Forbidden
    #[error("permission denied")]
    PermissionDenied,

    // 404 Not Found
    #[error("{0}")]
    NotFound(String),

    // 405 Method Not Allowed
    #[error("{0}")]
    MethodNotAllowed(String),

    // 500 Internal Server Error
    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    Internal(String),

    // 503 Service Unavailable
    #[error("plugin not started")]
    PluginNotStarted,

    // 504 Gateway Timeout
    #[error("backend request timed out after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Backend(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PluginNotStarted => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Short code used in logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::Backend(_) => "backend_error",
            Self::Internal(_) => "internal_error",
            Self::PluginNotStarted => "plugin_not_started",
            Self::Timeout(_) => "backend_timeout",
        }
    }

    /// Check if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    pub(crate) fn invalid_json(err: impl std::fmt::Display) -> Self {
        Self::BadRequest(format!("failed to parse JSON: {err}"))
    }

    pub(crate) fn lease_not_found() -> Self {
        Self::NotFound("lease not found".to_string())
    }

    pub(crate) fn method_not_allowed() -> Self {
        Self::MethodNotAllowed("method not allowed".to_string())
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied => Self::PermissionDenied,
            other => Self::Backend(other.to_string()),
        }
    }
}
