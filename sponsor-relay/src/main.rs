//! Sponsor Relay Service
//!
//! Serves the sponsor API: validates submitted transactions and forwards
//! accepted ones to the signer relay and block builders.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin sponsor-relay -- --config config/sponsor-relay.toml
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! SPONSOR_RELAY_CONFIG_PATH=config/sponsor-relay.toml cargo run --bin sponsor-relay
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

use anyhow::Result;
use clap::Parser;
use sponsor_relay::config::{Config, CONFIG_PATH_ENV};
use sponsor_relay::ApiServer;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sponsor-relay")]
#[command(about = "Fee-sponsoring relay for token account close and burn transactions")]
struct Args {
    /// Path to configuration file (default: config/sponsor-relay.toml or SPONSOR_RELAY_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first (before initializing logging)
    let args = Args::parse();

    init_logging();

    info!("Starting Sponsor Relay");

    // Priority: CLI arg > env var > default
    let config = if let Some(path) = args.config {
        info!("Loading configuration from: {}", path);
        Config::load_from_path(Some(&path))?
    } else {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            info!("Loading configuration from {}: {}", CONFIG_PATH_ENV, path);
        } else {
            info!("Loading configuration from default location");
        }
        Config::load()?
    };

    info!("Configuration loaded successfully");
    info!("Relay endpoint: {}", config.relay.endpoint);
    info!("Ledger RPC: {} ({})", config.ledger.rpc_url, config.ledger.commitment.as_str());
    info!("Block builders: {}", config.broadcast.block_builder_urls.len());

    let server = ApiServer::from_config(config)?;

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, stopping API server");
    };

    server.run(shutdown).await?;

    info!("Sponsor Relay stopped");
    Ok(())
}
