//! Error types for PXS

use thiserror::Error;

/// Result type alias for PXS core operations
pub type Result<T> = std::result::Result<T, Error>;

/// PXS core error types
#[derive(Error, Debug)]
pub enum Error {
    /// No descriptor registered for an outbound message name
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// No name registered for an inbound message id
    #[error("unknown message id: {0}")]
    UnknownMessageId(u8),

    /// Buffer ended before all declared fields were read
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Value count does not match the descriptor structure
    #[error("{name}: expected {expected} fields, got {actual}")]
    FieldCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Value kind does not match the declared field type
    #[error("{name}: field {index} expects {expected}")]
    FieldTypeMismatch {
        name: String,
        index: usize,
        expected: &'static str,
    },

    /// Odd byte count or unpaired surrogate in a UTF-16 payload
    #[error("invalid utf-16 payload: {0}")]
    InvalidText(String),

    /// Numeric id already owned by another name in the same direction
    #[error("message id {id} already assigned to {existing}")]
    DuplicateId { id: u8, existing: String },

    /// Chunked payload exceeded or contradicted its declared length
    #[error("reassembly error: {0}")]
    Reassembly(String),

    /// Malformed protocol update
    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),

    /// Malformed signalling message
    #[error("parse error: {0}")]
    Parse(String),

    /// Data channel write failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Data channel not attached
    #[error("data channel not open")]
    ChannelClosed,
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
