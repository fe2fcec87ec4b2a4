//! Transport trait definitions
//!
//! The relay and the client only see these traits. A connection is split
//! into a sender, shared between tasks, and a receiver owned by the
//! connection's read loop. Close codes travel both ways so the relay can
//! tell a viewer why it was dropped.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;

use crate::error::Result;

/// What a receiver yields
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// Connection closed; `code` is the close frame code, or 1006 when the
    /// peer vanished without one
    Disconnected {
        code: Option<u16>,
        reason: Option<String>,
    },
    /// Text frame received
    Text(String),
    /// Binary frame (or raw TCP data) received
    Data(Bytes),
    /// Error occurred
    Error(String),
}

/// Write half of a connection
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send binary data
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Send a text frame
    async fn send_text(&self, text: String) -> Result<()>;

    /// False once either side has closed
    fn is_connected(&self) -> bool;

    /// Close normally
    async fn close(&self) -> Result<()>;

    /// Close with a status code and reason
    async fn close_with(&self, code: u16, reason: &str) -> Result<()>;
}

/// Read half of a connection
#[async_trait]
pub trait TransportReceiver: Send {
    /// Next event; `None` once the connection is gone
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Client side of a transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// The sender type for this transport
    type Sender: TransportSender;
    /// The receiver type for this transport
    type Receiver: TransportReceiver;

    /// Connect to a remote endpoint
    async fn connect(addr: &str) -> Result<(Self::Sender, Self::Receiver)>
    where
        Self: Sized;
}

/// A listener handing out accepted connections
#[async_trait]
pub trait TransportServer: Send + Sync {
    /// The sender type for accepted connections
    type Sender: TransportSender;
    /// The receiver type for accepted connections
    type Receiver: TransportReceiver;

    /// Accept a new connection
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)>;

    /// Get the local address
    fn local_addr(&self) -> Result<SocketAddr>;
}
