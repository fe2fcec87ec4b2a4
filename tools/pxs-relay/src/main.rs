//! PXS Relay Server
//!
//! Accepts producers, viewers and an optional SFU on three listeners and
//! relays signalling between them.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pxs_core::PeerConnectionOptions;
use pxs_relay::{Relay, RelayConfig, SubscribeFallback};
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Fallback {
    Strict,
    AnyProducer,
}

impl From<Fallback> for SubscribeFallback {
    fn from(value: Fallback) -> Self {
        match value {
            Fallback::Strict => SubscribeFallback::Strict,
            Fallback::AnyProducer => SubscribeFallback::AnyProducer,
        }
    }
}

#[derive(Parser)]
#[command(name = "pxs-relay")]
#[command(about = "PXS Signalling Relay")]
#[command(version)]
struct Cli {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind all listeners to
    #[arg(long)]
    host: Option<String>,

    /// Producer listener port
    #[arg(long)]
    streamer_port: Option<u16>,

    /// Viewer listener port
    #[arg(long)]
    player_port: Option<u16>,

    /// SFU listener port
    #[arg(long)]
    sfu_port: Option<u16>,

    /// Maximum concurrent viewers, 0 for no limit
    #[arg(long)]
    max_players: Option<usize>,

    /// What to do when a viewer subscribes to an unknown producer
    #[arg(long, value_enum)]
    subscribe_fallback: Option<Fallback>,

    /// Peer connection options sent to viewers, as JSON
    #[arg(long)]
    peer_connection_options: Option<String>,

    /// Register with a matchmaker
    #[arg(long)]
    matchmaker: bool,

    /// Matchmaker host
    #[arg(long)]
    matchmaker_address: Option<String>,

    /// Matchmaker port
    #[arg(long)]
    matchmaker_port: Option<u16>,

    /// Address advertised to the matchmaker
    #[arg(long)]
    public_address: Option<String>,

    /// Port advertised to the matchmaker
    #[arg(long)]
    public_port: Option<u16>,

    /// Seconds between matchmaker keep-alive pings
    #[arg(long)]
    keepalive_interval: Option<u64>,

    /// Seconds between matchmaker reconnect attempts
    #[arg(long)]
    retry_interval: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Build the relay configuration: file first, then flags on top
    fn relay_config(&self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => RelayConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.streamer_port {
            config.streamer_port = port;
        }
        if let Some(port) = self.player_port {
            config.player_port = port;
        }
        if let Some(port) = self.sfu_port {
            config.sfu_port = port;
        }
        if let Some(max) = self.max_players {
            config.max_players = max;
        }
        if let Some(fallback) = self.subscribe_fallback {
            config.subscribe_fallback = fallback.into();
        }
        if let Some(json) = &self.peer_connection_options {
            config.peer_connection_options = serde_json::from_str::<PeerConnectionOptions>(json)
                .context("invalid --peer-connection-options")?;
        }

        let matchmaker = &mut config.matchmaker;
        if self.matchmaker {
            matchmaker.enabled = true;
        }
        if let Some(address) = &self.matchmaker_address {
            matchmaker.address = address.clone();
        }
        if let Some(port) = self.matchmaker_port {
            matchmaker.port = port;
        }
        if let Some(address) = &self.public_address {
            matchmaker.public_address = address.clone();
        }
        if let Some(port) = self.public_port {
            matchmaker.public_port = port;
        }
        if let Some(secs) = self.keepalive_interval {
            matchmaker.keepalive_interval_secs = secs;
        }
        if let Some(secs) = self.retry_interval {
            matchmaker.retry_interval_secs = secs;
        }

        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<RelayConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
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

    let config = cli.relay_config()?;

    info!("Starting PXS Relay");
    info!("Producers on: {}", config.streamer_addr());
    info!("Viewers on: {}", config.player_addr());
    info!("SFU on: {}", config.sfu_addr());
    if config.matchmaker.enabled {
        info!("Matchmaker at: {}", config.matchmaker.addr());
    }

    let relay = Relay::new(config);

    tokio::select! {
        result = relay.serve() => result?,
        _ = wait_for_shutdown() => relay.shutdown().await,
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "pxs-relay",
            "--player-port",
            "8080",
            "--max-players",
            "2",
            "--subscribe-fallback",
            "strict",
            "--matchmaker",
            "--public-address",
            "203.0.113.7",
            "--peer-connection-options",
            r#"{"iceServers":[{"urls":["turn:turn.example.com:3478"],"username":"u","credential":"p"}]}"#,
        ]);
        let config = cli.relay_config().unwrap();

        assert_eq!(config.player_port, 8080);
        assert_eq!(config.streamer_port, 8888);
        assert_eq!(config.max_players, 2);
        assert_eq!(config.subscribe_fallback, SubscribeFallback::Strict);
        assert!(config.matchmaker.enabled);
        assert_eq!(config.matchmaker.public_address, "203.0.113.7");
        assert!(config.peer_connection_options.has_turn_server());
    }

    #[test]
    fn test_toml_config() {
        let config: RelayConfig = toml::from_str(
            r#"
            host = "127.0.0.1"
            streamer_port = 9000
            max_players = 8

            [matchmaker]
            enabled = true
            port = 9998
            "#,
        )
        .unwrap();

        assert_eq!(config.streamer_addr(), "127.0.0.1:9000");
        assert_eq!(config.max_players, 8);
        assert!(config.matchmaker.enabled);
        assert_eq!(config.matchmaker.port, 9998);
        assert_eq!(config.player_port, 80);
    }

    #[test]
    fn test_bad_peer_connection_options() {
        let cli = Cli::parse_from(["pxs-relay", "--peer-connection-options", "not json"]);
        assert!(cli.relay_config().is_err());
    }
}
