use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::response::Envelope;

/// Expected request failures. Every variant renders as
/// `{"success": false, "error": "<message>"}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    DownloadFailed(String),

    #[error("{0}")]
    SendFailed(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_authenticated() -> Self {
        ApiError::Unauthenticated("Not authenticated!".to_string())
    }
}

/// Expected failures are part of the API contract: clients branch on
/// `success`, so the envelope always travels with 200 OK.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            // Auth rejections are routine, keep them out of warn/error output
            ApiError::Unauthenticated(msg) => tracing::debug!("Unauthenticated: {}", msg),
            ApiError::Validation(msg) => tracing::warn!("Validation failed: {}", msg),
            ApiError::NotFound(msg) => tracing::warn!("Not found: {}", msg),
            ApiError::DownloadFailed(msg) => tracing::warn!("Download failed: {}", msg),
            ApiError::SendFailed(msg) => tracing::error!("Send failed: {}", msg),
            ApiError::Internal(msg) => tracing::error!("Internal error: {}", msg),
        }

        (StatusCode::OK, Json(Envelope::error(self.to_string()))).into_response()
    }
}
