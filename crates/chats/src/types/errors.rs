//! Error types for the chat room.

use thiserror::Error;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Failures reported to the connection (or uploader) that caused them.
///
/// A non-admin capacity change is deliberately absent: it is dropped and
/// logged, never surfaced to the requester.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Room is full (capacity {capacity})")]
    RoomFull { capacity: usize },

    #[error("Connection has already joined the room")]
    AlreadyJoined,

    #[error("Connection has not joined the room")]
    NotJoined,

    #[error("Invalid display name: {reason}")]
    InvalidName { reason: String },

    #[error("Invalid capacity {value}: must be a positive integer")]
    InvalidCapacity { value: i64 },

    #[error("File not found: {key}")]
    FileNotFound { key: String },

    #[error("File of {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Upload storage is full ({limit} files)")]
    StorageFull { limit: usize },

    #[error("File upload error: {message}")]
    FileUpload { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl ChatError {
    /// Create an invalid name error
    pub fn invalid_name(reason: impl Into<String>) -> Self {
        Self::InvalidName {
            reason: reason.into(),
        }
    }

    /// Create a not found error for stored files
    pub fn file_not_found(key: impl Into<String>) -> Self {
        Self::FileNotFound { key: key.into() }
    }

    /// Create a file upload error
    pub fn file_upload(message: impl Into<String>) -> Self {
        Self::FileUpload {
            message: message.into(),
        }
    }

    /// Stable code sent to clients in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomFull { .. } => "room_full",
            Self::AlreadyJoined => "already_joined",
            Self::NotJoined => "not_joined",
            Self::InvalidName { .. } => "invalid_name",
            Self::InvalidCapacity { .. } => "invalid_capacity",
            Self::FileNotFound { .. } => "file_not_found",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::StorageFull { .. } => "storage_full",
            Self::FileUpload { .. } => "upload_failed",
            Self::Validation { .. } => "invalid_request",
        }
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        Self::FileUpload {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation {
            message: format!("Invalid event format: {}", err),
        }
    }
}
