//! Service registry server.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │               discovery-server               │
//!                      │                                              │
//!   register/heartbeat │  ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//!   ───────────────────┼─▶│   http   │──▶│ registry │──▶│  store   │  │
//!   query              │  │ handlers │   │ service  │   │ (DashMap)│  │
//!   ◀──────────────────┼──│          │◀──│          │◀──│          │  │
//!                      │  └──────────┘   └────┬─────┘   └──────────┘  │
//!                      │                      │ expiry sweep          │
//!                      │                      ▼                       │
//!                      │  ┌────────────────────────────────────────┐  │
//!                      │  │ config │ observability │ lifecycle │ rl │  │
//!                      │  └────────────────────────────────────────┘  │
//!                      └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use discovery_mesh::config::{load_config, DiscoveryConfig};
use discovery_mesh::lifecycle::{spawn_signal_handler, Shutdown};
use discovery_mesh::observability::{logging, metrics};
use discovery_mesh::RegistryServer;

#[derive(Parser)]
#[command(name = "discovery-server")]
#[command(about = "Service registry with heartbeat-based liveness", long_about = None)]
struct Args {
    /// Path to a TOML config file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => DiscoveryConfig::default(),
    };

    logging::init_logging(&config.observability.log_level)?;

    tracing::info!("discovery-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        instance_ttl_secs = config.registry.instance_ttl_secs,
        sweep_interval_secs = config.registry.sweep_interval_secs,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    RegistryServer::new(config).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
