//! PXS Client Library
//!
//! Viewer-side negotiation with a producer through the PXS relay. The
//! platform supplies the WebRTC peer connection; this crate sequences the
//! signalling around it.
//!
//! # Example
//!
//! ```ignore
//! use pxs_client::{NegotiationConfig, NoopObserver, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> pxs_client::Result<()> {
//!     let config = NegotiationConfig::builder()
//!         .preferred_producer("Game")
//!         .build();
//!
//!     let session = Session::connect("ws://localhost:80", config, factory, Arc::new(NoopObserver)).await?;
//!     session.wait_until(|state| state.is_connected()).await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod debounce;
pub mod error;
pub mod peer;
pub mod sequencer;
pub mod session;
pub mod state;
pub mod stats;

pub use builder::{NegotiationConfig, NegotiationConfigBuilder, OfferMode};
pub use debounce::{resolution_command, Debouncer, ResizeRequester};
pub use error::{ClientError, Result};
pub use peer::{
    DataChannelInit, NoopObserver, PeerConnection, PeerConnectionFactory, PeerEvent, SdpType,
    SessionDescription, SessionObserver, SignallingSink,
};
pub use sequencer::NegotiationSequencer;
pub use session::{Session, TransportSink};
pub use state::NegotiationState;
pub use stats::StatsPoll;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::{NegotiationConfig, OfferMode};
    pub use crate::error::{ClientError, Result};
    pub use crate::peer::{PeerConnection, PeerConnectionFactory, PeerEvent, SessionObserver};
    pub use crate::session::Session;
    pub use crate::state::NegotiationState;
    pub use pxs_core::SignallingMessage;
}
