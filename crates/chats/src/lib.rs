//! # Huddle Chats Crate
//!
//! Core logic of the single chat room hosted by a Huddle server: membership,
//! admin election and capacity control, the ordered message log with its
//! broadcaster, and the file relay used for shared uploads.
//!
//! ## Architecture
//!
//! - **Entities**: Domain models (Member, ChatMessage, FileHandle, ...)
//! - **Services**: `Room` state machine, `RoomHub` session coordinator, `FileRelay`
//! - **Types**: Wire events, errors and read-only views
//! - **Utils**: Input sanitizers
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use huddle_chats::{ConnectionId, FileRelay, RoomHub};
//! use huddle_config::AppConfig;
//!
//! # async fn run() -> huddle_chats::ChatResult<()> {
//! let config = AppConfig::default();
//! let relay = Arc::new(FileRelay::open(&config.uploads).await?);
//! let hub = RoomHub::new(&config.room, relay);
//!
//! let (tx, _rx) = tokio::sync::mpsc::channel(hub.outbound_buffer());
//! let id = ConnectionId::new();
//! hub.join(id, "ada", "127.0.0.1:9000".parse().unwrap(), tx).await?;
//! hub.post_text(id, "hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod entities;
pub mod services;
pub mod types;
pub mod utils;

pub use entities::{
    ChatMessage, ConnectionId, DisplayName, FileHandle, Member, MessageKind, NewMessage, StorageKey,
};
pub use services::{AdminState, FileRelay, Outbound, Room, RoomHub};
pub use types::{ChatError, ChatResult, ClientEvent, MemberSummary, RoomSnapshot, ServerEvent};
