//! Error types for the exporter server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for exporter operations.
pub type ExporterResult<T> = Result<T, ExporterError>;

/// Errors that can occur in the exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    /// No database driver was compiled in.
    #[error("no database driver available: rebuild with `--features odbc`")]
    DriverUnavailable,

    /// A scrape cycle triggered by a request did not complete.
    #[error("scrape cycle aborted: {0}")]
    CycleAborted(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ExporterError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Self::DriverUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "driver_unavailable"),
            Self::CycleAborted(_) => (StatusCode::SERVICE_UNAVAILABLE, "cycle_aborted"),
            Self::BindFailed(_, _) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}
