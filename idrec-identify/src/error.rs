//! HTTP error mapping
//!
//! `InvalidInput` → 400, `NotFound` → 404, storage failures and timeouts →
//! 503 flagged retryable. Anything else is a 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed path or body (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Engine or store error
    #[error(transparent)]
    Identity(#[from] idrec_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        use idrec_common::Error as E;

        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ApiError::Identity(err) => match err {
                E::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                E::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                E::Storage(_) | E::Timeout(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_ERROR"),
                E::Config(_) | E::Io(_) | E::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }

    fn retryable(&self) -> bool {
        match self {
            ApiError::BadRequest(_) => false,
            ApiError::Identity(err) => err.is_retryable(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = self.to_string();

        if status.is_server_error() {
            error!(code = error_code, "Request failed: {}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "retryable": self.retryable(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
