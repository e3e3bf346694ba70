//! Error types for the gateway
//!
//! `AppError` is the HTTP boundary: every handler failure becomes a JSON body
//! of the form `{"error": {"code", "message"}}`. Egress failures are mapped
//! here so that no handler decides on its own what an upstream detail leaks.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::egress::EgressError;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    #[error("target does not match any configured provider")]
    ProviderUnmatched,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error(transparent)]
    Egress(#[from] EgressError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl AppError {
    /// Status, machine-readable code and caller-facing message
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::ProviderUnmatched => (
                StatusCode::FORBIDDEN,
                "PROVIDER_UNMATCHED",
                self.to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::UpstreamError(msg) => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone())
            }
            AppError::Egress(err) => egress_parts(err),
            AppError::JsonError(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_JSON",
                "Invalid JSON in request".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

fn egress_parts(err: &EgressError) -> (StatusCode, &'static str, String) {
    match err {
        EgressError::PolicyDenied(reason) => {
            (StatusCode::FORBIDDEN, "POLICY_DENIED", reason.to_string())
        }
        EgressError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        EgressError::Timeout { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ETIMEDOUT",
            err.to_string(),
        ),
        EgressError::TooLarge { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "TOO_LARGE",
            err.to_string(),
        ),
        EgressError::RedirectLimitExceeded { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "REDIRECT_LIMIT",
            err.to_string(),
        ),
        EgressError::InvalidRedirect(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INVALID_REDIRECT",
            err.to_string(),
        ),
        EgressError::Upstream(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "UPSTREAM_ERROR",
            err.to_string(),
        ),
        // Connection-level detail stays in the logs
        EgressError::Network(_) | EgressError::Sink(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "NETWORK_ERROR",
            "Upstream request failed".to_string(),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = ?self, code, "Request failed");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
