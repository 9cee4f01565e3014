use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error: Failed to persist file record - {}", e),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, format!("Error: {}", msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Transform(msg) => {
                tracing::error!("Transform error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error: Failed to process the file - {}", msg),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error: Failed to save a file into the proper directory - {}", msg),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", msg))
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl AppError {
    /// Prefixes the message with the originating filename so a mixed
    /// multi-file outcome names the part that failed.
    pub fn for_file(self, filename: &str) -> Self {
        match self {
            AppError::Database(e) => AppError::Internal(format!("{}: {}", filename, e)),
            AppError::BadRequest(m) => AppError::BadRequest(format!("{}: {}", filename, m)),
            AppError::NotFound(m) => AppError::NotFound(format!("{}: {}", filename, m)),
            AppError::Conflict(m) => AppError::Conflict(format!("{}: {}", filename, m)),
            AppError::PayloadTooLarge(m) => {
                AppError::PayloadTooLarge(format!("{}: {}", filename, m))
            }
            AppError::Transform(m) => AppError::Transform(format!("{}: {}", filename, m)),
            AppError::Storage(m) => AppError::Storage(format!("{}: {}", filename, m)),
            AppError::Internal(m) => AppError::Internal(format!("{}: {}", filename, m)),
        }
    }
}
