//! Cadence Hub Server
//!
//! Serves the cadence event hub over WebSocket, persisting logged-in users'
//! playlists as JSON files.

mod config;

use anyhow::{Context, Result};
use cadence_router::{
    Hub, Identity, JsonFileProfileStore, MemoryProfileStore, ProfileStore, StaticTokens,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{parse_token, FileConfig};

#[derive(Parser)]
#[command(name = "cadence-server")]
#[command(about = "Cadence now-playing hub")]
#[command(version)]
struct Cli {
    /// Listen address [default: 0.0.0.0:7440]
    #[arg(short, long, env = "CADENCE_LISTEN")]
    listen: Option<SocketAddr>,

    /// Config file path (TOML)
    #[arg(short, long, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for profile records; profiles stay in memory without it
    #[arg(short, long, env = "CADENCE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Bearer tokens as TOKEN=IDENTITY, comma separated
    #[arg(short, long, env = "CADENCE_TOKENS", value_delimiter = ',')]
    tokens: Vec<String>,

    /// Server name, used in logs
    #[arg(short, long)]
    name: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let mut hub_config = file.hub;
    if let Some(name) = cli.name {
        hub_config.name = name;
    }
    let listen = cli
        .listen
        .or(file.listen)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], cadence_core::DEFAULT_WS_PORT)));

    let tokens = StaticTokens::new();
    for (token, identity) in file.tokens {
        tokens.register(token, Identity::new(identity));
    }
    for pair in &cli.tokens {
        let (token, identity) = parse_token(pair)?;
        tokens.register(token, Identity::new(identity));
    }

    let profiles: Arc<dyn ProfileStore> = match cli.data_dir.or(file.data_dir) {
        Some(dir) => {
            let store = JsonFileProfileStore::open(&dir)
                .await
                .with_context(|| format!("opening data dir {}", dir.display()))?;
            tracing::info!("Profiles stored in {}", dir.display());
            Arc::new(store)
        }
        None => {
            tracing::warn!("No data dir configured, profiles are kept in memory only");
            Arc::new(MemoryProfileStore::new())
        }
    };

    tracing::info!("Starting {}", hub_config.name);
    tracing::info!("Listening on: {}", listen);
    tracing::info!("{} bearer tokens configured", tokens.len());

    let hub = Hub::new(hub_config, profiles)
        .context("invalid hub configuration")?
        .with_authenticator(Arc::new(tokens));

    // Run until interrupted
    let addr = listen.to_string();
    tokio::select! {
        served = hub.serve_websocket(&addr) => served?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            if let Err(e) = hub.shutdown().await {
                tracing::warn!("Shutdown incomplete: {}", e);
            }
        }
    }

    Ok(())
}
