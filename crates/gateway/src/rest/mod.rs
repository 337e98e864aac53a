//! REST API endpoints for the gateway

pub mod files;
pub mod health;
pub mod room;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::state::GatewayState;

/// Create all REST API routes
pub fn create_rest_routes(max_upload_bytes: u64) -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/health", get(health::health_check))
        // Upload and download routes
        .merge(files::create_file_routes(max_upload_bytes))
        // Room inspection
        .merge(room::create_room_routes())
}

// Re-export for convenience
pub use files::*;
pub use health::*;
pub use room::*;
