//! Shared types for the chat room: errors, wire events and read-only views.

pub mod errors;
pub mod events;
pub mod responses;

pub use errors::{ChatError, ChatResult};
pub use events::{ClientEvent, ServerEvent};
pub use responses::{MemberSummary, RoomSnapshot};
