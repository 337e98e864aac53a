//! Error types for the gateway layer

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use huddle_chats::ChatError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Insufficient storage: {0}")]
    InsufficientStorage(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::InsufficientStorage(_) => StatusCode::INSUFFICIENT_STORAGE,
            GatewayError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let error_response = json!({
            "error": status.as_str(),
            "message": self.to_string(),
        });

        (status, Json(error_response)).into_response()
    }
}

/// Body of every error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status code as a string
    pub error: String,
    pub message: String,
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<ChatError> for GatewayError {
    fn from(error: ChatError) -> Self {
        match error {
            ChatError::FileNotFound { .. } => GatewayError::NotFound(error.to_string()),
            ChatError::FileTooLarge { .. } => GatewayError::PayloadTooLarge(error.to_string()),
            ChatError::StorageFull { .. } => GatewayError::InsufficientStorage(error.to_string()),
            ChatError::FileUpload { message } => GatewayError::InternalError(message),
            ChatError::RoomFull { .. } => GatewayError::ServiceUnavailable,
            other => GatewayError::InvalidRequest(other.to_string()),
        }
    }
}

impl From<MultipartError> for GatewayError {
    fn from(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge(error.body_text())
        } else {
            GatewayError::InvalidRequest(error.body_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_map_to_http_statuses() {
        let cases = [
            (ChatError::file_not_found("k"), StatusCode::NOT_FOUND),
            (
                ChatError::FileTooLarge { size: 2, limit: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (ChatError::StorageFull { limit: 1 }, StatusCode::INSUFFICIENT_STORAGE),
            (ChatError::file_upload("disk"), StatusCode::INTERNAL_SERVER_ERROR),
            (ChatError::NotJoined, StatusCode::BAD_REQUEST),
        ];

        for (error, status) in cases {
            assert_eq!(GatewayError::from(error).status_code(), status);
        }
    }
}
