use crate::metrics;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatline_core::ChatError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Missing or invalid caller identity")]
    Unauthenticated,

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Chat(e) => e.kind(),
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        metrics::record_error(self.kind());

        let (status, message) = match &self {
            ApiError::Chat(ChatError::NotFound(_)) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Chat(ChatError::Unauthorized(_) | ChatError::TimeWindowExceeded { .. }) => {
                (StatusCode::FORBIDDEN, self.to_string())
            }
            ApiError::Chat(ChatError::InvalidInput(_)) | ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Chat(ChatError::Conflict(_)) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Chat(ChatError::MessageDeleted) => (StatusCode::GONE, self.to_string()),
            ApiError::Chat(ChatError::Storage(detail)) => {
                error!(error = %detail, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
