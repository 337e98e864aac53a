//! Read-only views of room state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{ConnectionId, DisplayName};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSummary {
    pub connection_id: ConnectionId,
    pub display_name: DisplayName,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

/// Point-in-time copy of the room, taken under the room lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub capacity: usize,
    pub admin: Option<ConnectionId>,
    pub members: Vec<MemberSummary>,
    pub history_len: usize,
    pub next_sequence: u64,
}
