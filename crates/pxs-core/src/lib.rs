//! PXS Core
//!
//! Core types and encoding for the PXS pixel streaming protocol.
//!
//! This crate provides:
//! - The data channel wire codec ([`wire`], [`FieldType`], [`FieldValue`])
//! - Direction-scoped descriptor tables ([`ProtocolTable`], [`Direction`])
//! - The baseline message set ([`defaults`])
//! - Runtime protocol updates ([`protocol`])
//! - Handler dispatch and table swapping ([`MessageProtocolRegistry`])
//! - Chunked payload reassembly ([`assembly`])
//! - The JSON signalling envelope ([`SignallingMessage`])

pub mod assembly;
pub mod defaults;
pub mod descriptor;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod signalling;
pub mod wire;

pub use assembly::{ChunkAssembler, FileTransfer, ReceivedFile};
pub use descriptor::{Direction, MessageDescriptor, PayloadKind, ProtocolTable};
pub use error::{Error, Result};
pub use protocol::{ProtocolEntry, ProtocolReport, ProtocolUpdate};
pub use registry::{
    DataChannelSink, Handler, InboundMessage, InboundPayload, MessageProtocolRegistry,
    OutboundMessage,
};
pub use signalling::{close_code, IceServer, PeerConnectionOptions, SignallingMessage};
pub use wire::{FieldType, FieldValue};

/// Player id producers use to address the SFU.
pub const SFU_PLAYER_ID: &str = "1";

/// First id handed out to viewers.
pub const FIRST_PLAYER_ID: u64 = 100;

/// Default producer (streamer) WebSocket port
pub const DEFAULT_STREAMER_PORT: u16 = 8888;

/// Default viewer (player) WebSocket port
pub const DEFAULT_PLAYER_PORT: u16 = 80;

/// Default SFU WebSocket port
pub const DEFAULT_SFU_PORT: u16 = 8889;

/// Default matchmaker port
pub const DEFAULT_MATCHMAKER_PORT: u16 = 9999;
