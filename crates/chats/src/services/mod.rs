//! Room services: the synchronous room state machine, the hub that serializes
//! access to it and fans events out, and the upload relay.

pub mod hub;
pub mod relay;
pub mod room;

pub use hub::{Outbound, RoomHub};
pub use relay::FileRelay;
pub use room::{AdminState, Admission, CapacityChange, Departure, Room};
