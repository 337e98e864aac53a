use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::types::{ChatError, ChatResult};
use crate::utils::escape_markup;

/// Server-assigned identity of one live transport connection.
///
/// This is the only trustworthy key for a member; display names are labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Untrusted, client-chosen label shown next to a member's messages.
///
/// Collisions between members are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    /// Trim, bound and escape a requested name.
    ///
    /// ```
    /// use huddle_chats::DisplayName;
    ///
    /// let name = DisplayName::parse("  <ada>  ", 32).unwrap();
    /// assert_eq!(name.as_str(), "&lt;ada&gt;");
    /// assert!(DisplayName::parse("   ", 32).is_err());
    /// ```
    pub fn parse(requested: &str, max_chars: usize) -> ChatResult<Self> {
        let trimmed = requested.trim();
        if trimmed.is_empty() {
            return Err(ChatError::invalid_name("name cannot be empty"));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(ChatError::invalid_name("name cannot contain control characters"));
        }
        let length = trimmed.chars().count();
        if length > max_chars {
            return Err(ChatError::invalid_name(format!(
                "name is {length} characters, the limit is {max_chars}"
            )));
        }
        Ok(Self(escape_markup(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered participant tied to one live connection.
#[derive(Debug, Clone, Serialize)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub display_name: DisplayName,
    pub remote_address: SocketAddr,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn new(connection_id: ConnectionId, display_name: DisplayName, remote_address: SocketAddr) -> Self {
        Self {
            connection_id,
            display_name,
            remote_address,
            joined_at: Utc::now(),
        }
    }
}
