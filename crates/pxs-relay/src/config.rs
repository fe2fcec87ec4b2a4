//! Relay configuration

use pxs_core::{
    PeerConnectionOptions, DEFAULT_MATCHMAKER_PORT, DEFAULT_PLAYER_PORT, DEFAULT_SFU_PORT,
    DEFAULT_STREAMER_PORT,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `subscribe` does with a producer id nobody registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscribeFallback {
    /// Reject the subscription
    Strict,
    /// Bind to any connected producer instead
    #[default]
    AnyProducer,
}

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interface all listeners bind to
    pub host: String,
    /// Producer (streamer) listener port
    pub streamer_port: u16,
    /// Viewer (player) listener port
    pub player_port: u16,
    /// SFU listener port
    pub sfu_port: u16,
    /// Maximum viewers, 0 for no limit
    pub max_players: usize,
    pub subscribe_fallback: SubscribeFallback,
    /// Sent to viewers and the SFU in `config`
    pub peer_connection_options: PeerConnectionOptions,
    pub matchmaker: MatchmakerConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            streamer_port: DEFAULT_STREAMER_PORT,
            player_port: DEFAULT_PLAYER_PORT,
            sfu_port: DEFAULT_SFU_PORT,
            max_players: 0,
            subscribe_fallback: SubscribeFallback::default(),
            peer_connection_options: PeerConnectionOptions::default(),
            matchmaker: MatchmakerConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn streamer_addr(&self) -> String {
        format!("{}:{}", self.host, self.streamer_port)
    }

    pub fn player_addr(&self) -> String {
        format!("{}:{}", self.host, self.player_port)
    }

    pub fn sfu_addr(&self) -> String {
        format!("{}:{}", self.host, self.sfu_port)
    }
}

/// Matchmaker link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakerConfig {
    pub enabled: bool,
    /// Matchmaker host
    pub address: String,
    pub port: u16,
    /// Address viewers should be sent to, as advertised in `connect`
    pub public_address: String,
    /// Port advertised in `connect`
    pub public_port: u16,
    pub retry_interval_secs: u64,
    pub keepalive_interval_secs: u64,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1".to_string(),
            port: DEFAULT_MATCHMAKER_PORT,
            public_address: "127.0.0.1".to_string(),
            public_port: DEFAULT_PLAYER_PORT,
            retry_interval_secs: 5,
            keepalive_interval_secs: 30,
        }
    }
}

impl MatchmakerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs.max(1))
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs.max(1))
    }
}
