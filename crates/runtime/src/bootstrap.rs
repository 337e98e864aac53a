//! Startup supervision.
//!
//! After the listener is bound, a background task waits for the server's own
//! `/health` to answer and then asks a [`PortExposer`] for a public URL. Both
//! waits are bounded; a timeout is logged and the server keeps running.

use std::sync::Arc;
use std::time::Duration;

use huddle_config::{AppConfig, BootstrapConfig};
use thiserror::Error;
use tracing::{info, warn};

use crate::exposure::{ExposureError, FixedUrl, PortExposer, TunnelCommand};

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Timed out after {after:?} waiting for {stage}")]
    Timeout {
        stage: &'static str,
        after: Duration,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Exposure(#[from] ExposureError),
}

/// Outcome of [`supervise`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub healthy: bool,
    pub public_url: Option<String>,
}

/// Local URL of the server's health endpoint.
pub fn health_url(config: &AppConfig) -> String {
    let scheme = if config.tls.enabled { "https" } else { "http" };
    let host = match config.http.address.as_str() {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" | "[::]" => "[::1]",
        other => other,
    };
    format!("{scheme}://{host}:{}/health", config.http.port)
}

/// Poll `url` until it answers with a success status.
pub async fn wait_for_health(
    url: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), BootstrapError> {
    // the server may be using its own self-signed certificate
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(poll_interval.max(Duration::from_secs(1)))
        .build()?;

    let poll = async {
        loop {
            match client.get(url).send().await {
                Ok(response) if response.status().is_success() => return,
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "health check not ready")
                }
                Err(error) => tracing::debug!(%error, "health check failed"),
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| BootstrapError::Timeout {
            stage: "health check",
            after: timeout,
        })
}

/// Ask `exposer` for a public URL, giving up after `timeout`.
pub async fn acquire_public_url(
    exposer: &dyn PortExposer,
    port: u16,
    timeout: Duration,
) -> Result<String, BootstrapError> {
    match tokio::time::timeout(timeout, exposer.expose(port)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(BootstrapError::Timeout {
            stage: "public URL",
            after: timeout,
        }),
    }
}

/// A fixed `public_url` wins over a tunnel command.
pub fn exposer_from_config(config: &BootstrapConfig) -> Option<Arc<dyn PortExposer>> {
    if let Some(url) = &config.public_url {
        return Some(Arc::new(FixedUrl(url.clone())));
    }
    config
        .tunnel
        .as_ref()
        .map(|tunnel| Arc::new(TunnelCommand::new(&tunnel.command, tunnel.args.clone())) as Arc<dyn PortExposer>)
}

/// Run the health check and, when it passes, the exposure step.
///
/// Failures are logged and reflected in the report, never returned.
pub async fn supervise(
    config: &BootstrapConfig,
    health_url: &str,
    port: u16,
    exposer: Option<&dyn PortExposer>,
) -> BootstrapReport {
    let mut report = BootstrapReport::default();

    let health_timeout = Duration::from_secs(config.health_timeout_seconds);
    let poll_interval = Duration::from_millis(config.poll_interval_millis);
    match wait_for_health(health_url, health_timeout, poll_interval).await {
        Ok(()) => {
            info!(url = health_url, "server reported healthy");
            report.healthy = true;
        }
        Err(error) => {
            warn!(%error, url = health_url, "server did not become healthy; continuing without exposure");
            return report;
        }
    }

    let Some(exposer) = exposer else {
        return report;
    };

    let tunnel_timeout = Duration::from_secs(config.tunnel_timeout_seconds);
    match acquire_public_url(exposer, port, tunnel_timeout).await {
        Ok(url) => {
            info!(%url, "room is publicly reachable");
            report.public_url = Some(url);
        }
        Err(error) => warn!(%error, "failed to obtain a public URL; serving locally only"),
    }

    report
}
