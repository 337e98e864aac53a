use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file::FileHandle;
use super::member::DisplayName;
use crate::utils::escape_markup;

/// Kind of a logged chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    FileShare,
    System,
}

/// A message as stored in the room log. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Position in the log, strictly increasing from 0
    pub sequence: u64,
    pub kind: MessageKind,
    /// Sender's name at the time of sending; absent for system messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<DisplayName>,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileHandle>,
    pub created_at: DateTime<Utc>,
}

/// A message before the log assigns its sequence number.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub kind: MessageKind,
    pub sender: Option<DisplayName>,
    pub body: String,
    pub file: Option<FileHandle>,
}

impl NewMessage {
    /// Member text, escaped before it is stored.
    pub fn text(sender: DisplayName, body: &str) -> Self {
        Self {
            kind: MessageKind::Text,
            sender: Some(sender),
            body: escape_markup(body),
            file: None,
        }
    }

    pub fn system(body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            sender: None,
            body: body.into(),
            file: None,
        }
    }

    /// Announce an uploaded file; the body carries its retrieval link.
    pub fn file_share(sender: DisplayName, handle: FileHandle) -> Self {
        Self {
            kind: MessageKind::FileShare,
            sender: Some(sender),
            body: handle.url(),
            file: Some(handle),
        }
    }

    pub(crate) fn into_logged(self, sequence: u64) -> ChatMessage {
        ChatMessage {
            sequence,
            kind: self.kind,
            sender: self.sender,
            body: self.body,
            file: self.file,
            created_at: Utc::now(),
        }
    }
}
