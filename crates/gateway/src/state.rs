//! Shared application state for the gateway

use std::sync::Arc;

use huddle_chats::{FileRelay, RoomHub};
use huddle_config::AppConfig;

use crate::error::{GatewayError, GatewayResult};

/// Shared application state: the room hub, its upload relay and the
/// configuration the router was built from.
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub hub: Arc<RoomHub>,
    pub relay: Arc<FileRelay>,
    pub config: Arc<AppConfig>,
}

impl GatewayState {
    /// Create a gateway state around an existing hub
    pub fn new(hub: Arc<RoomHub>, config: AppConfig) -> Self {
        Self {
            relay: hub.relay().clone(),
            hub,
            config: Arc::new(config),
        }
    }

    /// Prepare upload storage and the room described by `config`
    pub async fn from_config(config: AppConfig) -> GatewayResult<Self> {
        let relay = FileRelay::open(&config.uploads)
            .await
            .map_err(|e| GatewayError::InternalError(format!("Failed to open upload storage: {}", e)))?;
        let hub = Arc::new(RoomHub::new(&config.room, Arc::new(relay)));

        Ok(Self::new(hub, config))
    }

    pub fn hub(&self) -> &RoomHub {
        &self.hub
    }
}
