//! Seams to the platform
//!
//! The WebRTC stack, the signalling connection and the presentation layer
//! are all supplied by the embedder through these traits.

use async_trait::async_trait;
use pxs_core::{PeerConnectionOptions, SignallingMessage};
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::state::NegotiationState;

/// Which side of an SDP exchange a description is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Data channel to open on the peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelInit {
    pub label: String,
    /// Pre-negotiated stream id; `None` lets the stack negotiate in-band
    pub negotiated_id: Option<u16>,
}

impl DataChannelInit {
    pub fn in_band(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            negotiated_id: None,
        }
    }

    pub fn negotiated(label: impl Into<String>, id: u16) -> Self {
        Self {
            label: label.into(),
            negotiated_id: Some(id),
        }
    }
}

/// A platform WebRTC peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<String>;
    async fn create_answer(&self) -> Result<String>;
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: Value) -> Result<()>;
    async fn create_data_channel(&self, init: DataChannelInit) -> Result<()>;
    /// Current statistics report, in whatever shape the platform produces
    async fn get_stats(&self) -> Result<Value>;
    async fn close(&self);
}

/// Creates peer connections once the relay has sent its options
pub trait PeerConnectionFactory: Send + Sync {
    fn create(&self, options: &PeerConnectionOptions) -> Result<Arc<dyn PeerConnection>>;
}

/// Events the platform reports about a peer connection
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A local ICE candidate was gathered
    IceCandidate(Value),
    IceConnected,
    IceFailed,
    DataChannelOpen,
    DataChannelClosed,
    /// Media playback was refused (autoplay policy)
    PlaybackRejected,
}

/// Writes signalling messages to the relay
#[async_trait]
pub trait SignallingSink: Send + Sync {
    async fn send(&self, msg: SignallingMessage) -> Result<()>;
}

/// Presentation-side notifications; every method defaults to doing nothing
pub trait SessionObserver: Send + Sync {
    fn on_state_change(&self, _state: &NegotiationState) {}

    /// Periodic statistics while connected
    fn on_stats(&self, _stats: &Value) {}

    fn on_player_count(&self, _count: usize) {}

    /// Input capture should start (true) or stop (false)
    fn on_input_enabled(&self, _enabled: bool) {}

    fn on_warning(&self, _message: &str) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
