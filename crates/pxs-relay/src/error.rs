//! Relay error types

use pxs_core::close_code;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("unknown producer: {0}")]
    UnknownProducer(String),

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("routing failure: {0}")]
    RoutingFailure(String),

    #[error("player limit of {0} reached")]
    CapacityExceeded(usize),

    #[error("producer {0} already has subscribers")]
    ProducerBusy(String),

    #[error("an SFU is already connected")]
    DuplicateSingleton,

    #[error("malformed message: {0}")]
    Parse(String),

    #[error("matchmaker unavailable: {0}")]
    MatchmakerUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] pxs_transport::TransportError),

    #[error("core protocol error: {0}")]
    Core(#[from] pxs_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Close code to send when this error ends a connection
    pub fn close_code(&self) -> Option<u16> {
        match self {
            RelayError::Parse(_) => Some(close_code::POLICY),
            RelayError::CapacityExceeded(_) | RelayError::DuplicateSingleton => {
                Some(close_code::TRY_AGAIN)
            }
            _ => None,
        }
    }
}
