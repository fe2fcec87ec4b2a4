//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("negotiation failed: {0}")]
    NegotiationFailure(String),

    #[error("No TURN server found in the peer connection options")]
    NoTurnServer,

    #[error("no producer available after {0} attempts")]
    NoProducer(u32),

    #[error("peer connection error: {0}")]
    Peer(String),

    #[error("signalling error: {0}")]
    Signalling(String),

    #[error("not connected")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(#[from] pxs_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] pxs_transport::TransportError),
}
