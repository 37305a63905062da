//! Error types for the HTTP layer

use crate::response::{full, IntoResponse, Response};
use backlog_core::SourceError;
use http::{header, StatusCode};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error response returned to HTTP clients
///
/// Rendered as `{"error":{"type":..,"message":..}}`. The `internal` detail is
/// logged, and only included in the body when the server is configured to
/// expose error details.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code
    pub status: StatusCode,
    /// Error type identifier
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    /// Internal details (hidden unless exposed)
    pub internal: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type: error_type.into(),
            message: message.into(),
            internal: None,
        }
    }

    /// Create a 404 Not Found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// Create a 405 Method Not Allowed error
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", message)
    }

    /// Create a 500 Internal Server Error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// Create a 503 Service Unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
    }

    /// Add internal details
    pub fn with_internal(mut self, details: impl Into<String>) -> Self {
        self.internal = Some(details.into());
        self
    }

    /// Drop internal details unless `expose` is set
    pub fn masked(mut self, expose: bool) -> Self {
        if !expose {
            self.internal = None;
        }
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(rename = "type")]
    error_type: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                error_type: &self.error_type,
                message: &self.message,
                detail: self.internal.as_deref(),
            },
        };
        let bytes = serde_json::to_vec(&body).unwrap_or_default();

        let mut response = Response::new(full(bytes));
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

impl From<SourceError> for ApiError {
    fn from(err: SourceError) -> Self {
        if err.is_unavailable() {
            ApiError::service_unavailable("Backlog source unavailable").with_internal(err.to_string())
        } else {
            ApiError::internal("Failed to query backlog").with_internal(err.to_string())
        }
    }
}

/// Failure to start or run the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid bind address `{0}`")]
    InvalidAddress(String),

    #[error("Invalid route `{path}`: {reason}")]
    Route { path: String, reason: String },
}
