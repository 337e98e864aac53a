//! Event types exchanged with connected clients.

use serde::{Deserialize, Serialize};

use crate::entities::{ChatMessage, ConnectionId, DisplayName};

/// Events a client sends over its connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Register in the room under a display name
    Join { name: String },
    /// Post a text message
    Message { text: String },
    /// Announce a file previously stored through the upload endpoint
    File { key: String },
    /// Admin-only capacity change
    SetCapacity { capacity: i64 },
    /// Heartbeat
    Ping,
}

/// Events pushed to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Join accepted
    Welcome {
        connection_id: ConnectionId,
        display_name: DisplayName,
        capacity: usize,
        is_admin: bool,
    },
    /// Retained history, oldest first, sent once after joining
    History { messages: Vec<ChatMessage> },
    /// A newly appended message
    Message { message: ChatMessage },
    /// Sent to a newly elected admin
    CapacityPrompt { capacity: usize },
    CapacityChanged { capacity: usize },
    /// Join rejected; the connection is closed afterwards
    RoomFull { capacity: usize },
    Error { code: String, message: String },
    Pong,
}

impl ServerEvent {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::types::ChatError> for ServerEvent {
    fn from(error: &crate::types::ChatError) -> Self {
        match error {
            crate::types::ChatError::RoomFull { capacity } => Self::RoomFull {
                capacity: *capacity,
            },
            other => Self::error(other.code(), other.to_string()),
        }
    }
}
