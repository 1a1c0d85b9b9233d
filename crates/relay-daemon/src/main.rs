//! # relay-daemon
//!
//! `relayd` binary: wires the session store, storage client, and bus into a
//! relay server and runs it until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_auth::{RedisSessionStore, SessionValidator};
use relay_bus::{EventBus, InMemoryBus, RedisBus};
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;
use relay_settings::{BusBackend, BusSettings, RelaySettings};
use relay_store::HttpStorageClient;

/// Real-time chat relay.
#[derive(Parser, Debug)]
#[command(name = "relayd", about = "Real-time chat relay")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    /// Load settings from the chosen file, then apply flag overrides.
    fn load_settings(&self) -> Result<RelaySettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(relay_settings::settings_path);
        let mut settings = relay_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

async fn connect_bus(settings: &BusSettings) -> Result<Arc<dyn EventBus>> {
    match settings.backend {
        BusBackend::Redis => {
            let bus = RedisBus::connect(&settings.redis_url, settings.channel.clone())
                .await
                .context("Failed to connect to the Redis bus")?;
            tracing::info!(channel = bus.channel(), "using Redis bus");
            Ok(Arc::new(bus))
        }
        BusBackend::Memory => {
            tracing::info!("using in-process bus (single instance only)");
            Ok(Arc::new(InMemoryBus::new(settings.memory_capacity)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    relay_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let sessions = RedisSessionStore::connect(
        &settings.session_store.redis_url,
        settings.session_store.key_prefix.clone(),
    )
    .await
    .context("Failed to connect to the session store")?;
    let validator = SessionValidator::new(Arc::new(sessions), settings.session_store.timeout());

    let storage = HttpStorageClient::new(&settings.storage.base_url, settings.storage.timeout())
        .context("Failed to build the storage client")?;
    let bus = connect_bus(&settings.bus).await?;

    let config = ServerConfig::from_settings(&settings);
    let mut server = RelayServer::new(config, validator, Arc::new(storage), bus);
    if settings.server.metrics_enabled {
        match relay_server::metrics::install_recorder() {
            Ok(handle) => server = server.with_metrics(handle),
            Err(e) => tracing::warn!(error = %e, "metrics disabled: recorder install failed"),
        }
    }

    let bridge = server
        .event_bridge(settings.bus.resubscribe_delay())
        .start()
        .await
        .context("Failed to subscribe to the bus")?;
    let (addr, serve) = server
        .listen()
        .await
        .context("Failed to bind listener")?;
    tracing::info!("relay listening on ws://{addr}/ws");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown_gracefully(vec![bridge, serve]).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
