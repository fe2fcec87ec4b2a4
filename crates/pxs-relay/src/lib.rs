//! PXS Relay
//!
//! The relay is the signalling hub between rendering processes and viewers:
//! - Registers producers, viewers and an optional SFU
//! - Tracks which producer each viewer is subscribed to
//! - Routes offer/answer/ICE and data channel setup between them
//! - Reports availability to an external matchmaker
//!
//! # Topologies
//!
//! Viewers either negotiate directly with their producer, or, when an SFU
//! is connected, through the SFU. A viewer can opt out of either hop with
//! `?skipSFU` / `?skipStreamer` on its connection URL.
//!
//! # Example
//!
//! ```no_run
//! use pxs_relay::{Relay, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = Relay::new(RelayConfig::default());
//!
//!     // Producers on 8888, viewers on 80, SFU on 8889
//!     relay.serve().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod matchmaker;
pub mod peer;
pub mod relay;
pub mod router;
pub mod task;

pub use config::{MatchmakerConfig, RelayConfig, SubscribeFallback};
pub use directory::{deliver, Delivery, Outgoing, SessionDirectory};
pub use error::{RelayError, Result};
pub use matchmaker::{MatchmakerClient, MatchmakerEvent, RelayStatus};
pub use peer::{Peer, RoutingPreference};
pub use relay::Relay;
pub use router::Router;
pub use task::{ScheduledTask, ShutdownSignal};
