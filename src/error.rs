//! Error types for kopek.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for kopek operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for kopek.
///
/// Configuration errors are not represented here: they can only occur
/// at startup and flow through anyhow at the binary edge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Timed out waiting for OpenRouter")]
    UpstreamTimeout,

    #[error("Failed to reach OpenRouter: {0}")]
    UpstreamUnavailable(String),

    #[error("{message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The HTTP status this error surfaces as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Error::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::UpstreamRejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = serde_json::json!({
            "error": self.to_string(),
            "status_code": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
