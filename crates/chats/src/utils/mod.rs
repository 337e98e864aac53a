//! Internal utilities for the chat system.

pub mod sanitize;

pub use sanitize::*;
