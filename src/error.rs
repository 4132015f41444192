/// Unified error types for the content storage service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum StorageError {
    /// Request body is not a well-formed multipart payload
    #[error("Malformed multipart request: {0}")]
    MalformedMultipart(String),

    /// Blob store rejected or failed a write
    #[error("Blob write failed: {0}")]
    StorageWrite(String),

    /// Blob store failed a read (including a row whose blob is missing)
    #[error("Blob read failed: {0}")]
    StorageRead(String),

    /// Unknown content id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Command or configuration validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Section size or section count cap exceeded
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Request was cancelled (client gone or server shutting down)
    #[error("Request cancelled")]
    Cancelled,

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Short machine-readable kind, used in responses and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::MalformedMultipart(_) => "MalformedMultipart",
            StorageError::StorageWrite(_) => "StorageWriteError",
            StorageError::StorageRead(_) => "StorageReadError",
            StorageError::NotFound(_) => "NotFound",
            StorageError::Validation(_) => "ValidationError",
            StorageError::PayloadTooLarge(_) => "PayloadTooLarge",
            StorageError::Cancelled => "Cancelled",
            StorageError::Database(_) | StorageError::Io(_) | StorageError::Internal(_) => {
                "InternalServerError"
            }
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            StorageError::MalformedMultipart(_) | StorageError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            StorageError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            StorageError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            StorageError::StorageWrite(_)
            | StorageError::StorageRead(_)
            | StorageError::Database(_)
            | StorageError::Io(_)
            | StorageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert StorageError to HTTP response
impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            StorageError::Database(_) | StorageError::Io(_) | StorageError::Internal(_) => {
                tracing::error!("Internal error: {}", self);
                "Internal server error".to_string() // Don't leak details
            }
            StorageError::StorageWrite(_) | StorageError::StorageRead(_) => {
                tracing::error!("{}", self);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            StorageError::MalformedMultipart("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(StorageError::NotFound("1".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            StorageError::StorageWrite("s3".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            StorageError::StorageRead("s3".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            StorageError::PayloadTooLarge("big".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_internal_details_not_leaked() {
        let response = StorageError::Internal("secret path /etc".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(StorageError::Cancelled.kind(), "Cancelled");
        assert_eq!(StorageError::Validation("x".into()).kind(), "ValidationError");
        assert_eq!(
            StorageError::Io(std::io::Error::other("disk")).kind(),
            "InternalServerError"
        );
    }
}
