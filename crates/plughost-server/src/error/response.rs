//! Error response implementation.

use super::types::ApiError;
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

/// Error response body: `{"errors": [message]}`.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    errors: Vec<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            error!(error = %self, code = self.error_code(), "request failed");
        } else if matches!(self, ApiError::PermissionDenied) {
            warn!(code = self.error_code(), "backend denied request");
        }

        let body = ErrorResponse {
            errors: vec![self.to_string()],
        };
        (self.status_code(), Json(body)).into_response()
    }
}
