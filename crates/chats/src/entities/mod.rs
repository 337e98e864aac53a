//! Domain entities for the chat room.
//!
//! These are pure domain objects without transport concerns.

pub mod file;
pub mod member;
pub mod message;

pub use file::{FileHandle, StorageKey};
pub use member::{ConnectionId, DisplayName, Member};
pub use message::{ChatMessage, MessageKind, NewMessage};
