use std::sync::Arc;

use anyhow::{Context, Result};
use huddle_chats::{FileRelay, RoomHub};
use huddle_config::AppConfig;
use tokio_rustls::TlsAcceptor;
use tracing::info;

pub mod bootstrap;
pub mod exposure;
pub mod tls;

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Used when `RUST_LOG` is unset or invalid.
    pub const DEFAULT_FILTER: &str = "info,hyper=warn,tower_http=warn";

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Process-wide services built once at startup.
#[derive(Clone)]
pub struct RoomServices {
    pub hub: Arc<RoomHub>,
    /// Present when `tls.enabled` is set
    pub tls: Option<TlsAcceptor>,
}

impl RoomServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let relay = FileRelay::open(&config.uploads)
            .await
            .context("failed to prepare upload storage")?;
        let hub = Arc::new(RoomHub::new(&config.room, Arc::new(relay)));

        let tls = if config.tls.enabled {
            let material = tls::ensure_material(&config.tls).context("failed to prepare TLS material")?;
            let acceptor = tls::load_acceptor(&material).context("failed to load TLS material")?;
            Some(acceptor)
        } else {
            None
        };

        info!(
            capacity = config.room.capacity,
            history_limit = config.room.history_limit,
            tls = tls.is_some(),
            "room services ready"
        );

        Ok(Self { hub, tls })
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(?error, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(?error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
