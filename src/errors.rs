use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::platforms::PlatformError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("normalization error: {0}")]
    Normalization(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("message {id} is {status} and can no longer change")]
    InvalidTransition { id: String, status: String },

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedPlatform(_) => StatusCode::NOT_FOUND,
            AppError::Platform(PlatformError::RateLimitExceeded(_)) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Platform(PlatformError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Platform(_) => StatusCode::BAD_GATEWAY,
            AppError::Normalization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::InvalidSignature => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
