//! # Huddle Gateway Crate
//!
//! This crate provides the HTTP and WebSocket layer of a Huddle server. It
//! exposes the room over a WebSocket event channel, accepts uploads for file
//! sharing and serves any configured static applications under their path
//! prefixes.
//!
//! ## Architecture
//!
//! - **REST**: upload/download, health and room inspection endpoints
//! - **WebSocket**: the room event channel
//! - **State**: the shared room hub and configuration
//! - **Middleware**: CORS and request logging
//!
//! ## Usage
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use huddle_gateway::{create_router, GatewayState};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let state = GatewayState::from_config(huddle_config::AppConfig::default()).await?;
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:7070").await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod websocket;

// Re-export main types for convenience
pub use error::{GatewayError, GatewayResult};
pub use state::GatewayState;

use axum::{middleware as axum_middleware, Router};
use std::sync::Arc;
use tower_http::services::ServeDir;

/// Create the main application router with all routes
pub fn create_router(state: GatewayState) -> Router {
    let mounts = state.config.mounts.clone();
    let max_upload_bytes = state.config.uploads.max_bytes;
    let arc_state = Arc::new(state);

    let mut router = Router::new()
        // REST API routes
        .merge(rest::create_rest_routes(max_upload_bytes).with_state(arc_state.clone()))
        // WebSocket routes
        .merge(websocket::create_websocket_routes().with_state(arc_state));

    // Secondary applications under their own prefixes
    for mount in &mounts {
        let prefix = mount.prefix.trim_end_matches('/');
        tracing::info!(prefix, dir = %mount.dir, "mounting static application");
        router = router.nest_service(prefix, ServeDir::new(&mount.dir));
    }

    // Serve the OpenAPI document in debug builds
    #[cfg(debug_assertions)]
    {
        router = router.route("/api-docs/openapi.json", axum::routing::get(openapi_document));
    }

    router
        .layer(middleware::create_cors_middleware())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}

#[cfg(debug_assertions)]
mod docs {
    use crate::error::ErrorResponse;
    use crate::rest;
    use utoipa::OpenApi;

    #[derive(OpenApi)]
    #[openapi(
        paths(
            rest::health::health_check,
            rest::files::upload_file,
            rest::files::download_file,
            rest::room::get_room,
        ),
        components(
            schemas(
                rest::health::HealthResponse,
                rest::files::UploadResponse,
                rest::room::RoomResponse,
                rest::room::MemberResponse,
                ErrorResponse,
            )
        ),
        tags(
            (name = "Health", description = "Liveness"),
            (name = "Files", description = "Upload side-channel for shared files"),
            (name = "Room", description = "Room inspection"),
        )
    )]
    pub struct ApiDoc;
}

#[cfg(debug_assertions)]
async fn openapi_document() -> axum::Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    axum::Json(docs::ApiDoc::openapi())
}
