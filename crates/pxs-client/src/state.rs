//! Negotiation states

use std::fmt;

/// Where a viewer session is in its negotiation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    /// Waiting for the relay's `config`
    AwaitingConfig,
    /// Asked for `streamerList`, waiting for a non-empty answer
    AwaitingProducerList,
    /// Local offer created, about to be sent
    OfferCreated,
    /// Subscribed, waiting for the producer's offer
    AwaitingOffer,
    OfferReceived,
    /// Answer sent; with an SFU also waiting for `peerDataChannels`
    Answering,
    AwaitingAnswer,
    IceExchange,
    DataChannelOpening,
    Connected,
    Reconnecting {
        attempt: u32,
    },
    Failed {
        message: String,
    },
    Closed,
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Failed { .. } | NegotiationState::Closed)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, NegotiationState::Connected)
    }

    pub fn name(&self) -> &'static str {
        match self {
            NegotiationState::Idle => "idle",
            NegotiationState::AwaitingConfig => "awaiting-config",
            NegotiationState::AwaitingProducerList => "awaiting-producer-list",
            NegotiationState::OfferCreated => "offer-created",
            NegotiationState::AwaitingOffer => "awaiting-offer",
            NegotiationState::OfferReceived => "offer-received",
            NegotiationState::Answering => "answering",
            NegotiationState::AwaitingAnswer => "awaiting-answer",
            NegotiationState::IceExchange => "ice-exchange",
            NegotiationState::DataChannelOpening => "data-channel-opening",
            NegotiationState::Connected => "connected",
            NegotiationState::Reconnecting { .. } => "reconnecting",
            NegotiationState::Failed { .. } => "failed",
            NegotiationState::Closed => "closed",
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            NegotiationState::Failed { message } => write!(f, "failed: {}", message),
            other => f.write_str(other.name()),
        }
    }
}
