use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use huddle_config::{load as load_config, AppConfig};
use huddle_gateway::{create_router, GatewayState};
use huddle_runtime::bootstrap;
use huddle_runtime::exposure::PortExposer;
use huddle_runtime::{shutdown_signal, telemetry, tls, RoomServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "huddle-server")]
#[command(about = "Single-room chat server (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Generate the self-signed TLS certificate if it does not exist yet
    Cert,
    /// Print the effective configuration as JSON
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::Cert => generate_certificate(),
        Commands::ShowConfig => show_config(),
    }
}

async fn run_server() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    info!("starting Huddle server");

    let mut config = load_config().context("failed to load configuration")?;

    let services = RoomServices::initialise(&config)
        .await
        .context("failed to initialise room services")?;

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;
    // port 0 binds an ephemeral port
    config.http.port = listener.local_addr()?.port();

    info!(
        %address,
        port = config.http.port,
        tls = services.tls.is_some(),
        "http server listening"
    );

    // held until exit so a tunnel child stays alive
    let _exposer = spawn_bootstrap(&config);

    let hub = services.hub.clone();
    let app = create_router(GatewayState::new(services.hub, config));
    let shutdown = async move {
        shutdown_signal().await;
        hub.close();
    };

    match services.tls {
        Some(acceptor) => tls::serve_tls(listener, acceptor, app, shutdown)
            .await
            .context("https server error")?,
        None => axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .context("http server error")?,
    }

    info!("server shut down");
    Ok(())
}

fn spawn_bootstrap(config: &AppConfig) -> Option<Arc<dyn PortExposer>> {
    if !config.bootstrap.enabled {
        return None;
    }

    let exposer = bootstrap::exposer_from_config(&config.bootstrap);
    let health_url = bootstrap::health_url(config);
    let bootstrap_config = config.bootstrap.clone();
    let port = config.http.port;
    let task_exposer = exposer.clone();

    tokio::spawn(async move {
        let report =
            bootstrap::supervise(&bootstrap_config, &health_url, port, task_exposer.as_deref()).await;
        info!(healthy = report.healthy, public_url = ?report.public_url, "bootstrap finished");
    });

    exposer
}

fn generate_certificate() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;
    let material = tls::ensure_material(&config.tls).context("failed to prepare TLS material")?;

    if material.generated {
        println!("Generated certificate for {}", config.tls.hostname);
    } else {
        println!("Certificate already present, nothing to do");
    }
    println!("  cert: {}", material.cert_path.display());
    println!("  key:  {}", material.key_path.display());

    Ok(())
}

fn show_config() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let rendered =
        serde_json::to_string_pretty(&config).context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}
