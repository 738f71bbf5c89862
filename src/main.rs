//! relay-gateway
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ http server ──▶ routing ──▶ gateway ──▶ protocol handler
//!                                                              │
//!                                         ┌────────────────────┼───────────────────┐
//!                                         ▼                    ▼                   ▼
//!                                   reverse proxy        grpc transport       raw / rpc
//!                                   (http, upgrade)      (pooled channels)    transports
//!                                         │                    │                   │
//!     Client Response                     ▼                    ▼                   ▼
//!     ◀───────────── status mapping ◀── handler writes response, hooks run
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use relay_gateway::config::{load_config, validate_config, ConfigError, GatewayConfig};
use relay_gateway::lifecycle::{bootstrap, signals, Shutdown};
use relay_gateway::observability::{logging, metrics};
use relay_gateway::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "relay-gateway", version, about = "Protocol-transforming API gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "relay-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let boot = bootstrap(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(signals::shutdown_on_signal(shutdown));

    let server = HttpServer::new(&config, boot.gateway, boot.routes);
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
