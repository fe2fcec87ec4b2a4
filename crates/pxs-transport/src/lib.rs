//! PXS Transport Layer
//!
//! This crate provides the duplex connections the relay and the client
//! signal over:
//! - WebSocket (text and binary frames, close codes) for producers,
//!   viewers and the SFU
//! - TCP (unframed JSON documents) for the matchmaker link

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketReceiver, WebSocketSender, WebSocketServer, WebSocketTransport};

#[cfg(feature = "tcp")]
pub use tcp::{TcpReceiver, TcpSender, TcpTransport};
