//! Read-only view of the room

use axum::{extract::State, routing::get, Json, Router};
use huddle_chats::{MemberSummary, RoomSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::state::GatewayState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoomResponse {
    pub capacity: usize,
    /// Connection id of the admin, if the seat is filled
    pub admin: Option<String>,
    pub members: Vec<MemberResponse>,
    /// Messages retained for replay
    pub history_len: usize,
    pub next_sequence: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemberResponse {
    pub connection_id: String,
    pub display_name: String,
    pub is_admin: bool,
    pub joined_at: String,
}

impl From<MemberSummary> for MemberResponse {
    fn from(member: MemberSummary) -> Self {
        Self {
            connection_id: member.connection_id.to_string(),
            display_name: member.display_name.to_string(),
            is_admin: member.is_admin,
            joined_at: member.joined_at.to_rfc3339(),
        }
    }
}

impl From<RoomSnapshot> for RoomResponse {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self {
            capacity: snapshot.capacity,
            admin: snapshot.admin.map(|id| id.to_string()),
            members: snapshot.members.into_iter().map(Into::into).collect(),
            history_len: snapshot.history_len,
            next_sequence: snapshot.next_sequence,
        }
    }
}

/// Create room routes
pub fn create_room_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/api/room", get(get_room))
}

#[utoipa::path(
    get,
    path = "/api/room",
    tag = "Room",
    responses(
        (status = 200, description = "Current members, capacity and log position", body = RoomResponse)
    )
)]
pub async fn get_room(State(state): State<Arc<GatewayState>>) -> Json<RoomResponse> {
    Json(state.hub.snapshot().await.into())
}
