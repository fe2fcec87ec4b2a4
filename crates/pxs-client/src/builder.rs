//! Negotiation configuration builder

use std::time::Duration;

/// Who creates the SDP offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OfferMode {
    /// The producer offers, the viewer answers
    #[default]
    ProducerOffers,
    /// The viewer offers after subscribing
    ViewerOffers,
}

/// Settings for one viewer session
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationConfig {
    pub offer_mode: OfferMode,
    /// Fail unless the relay provides a TURN server
    pub force_turn: bool,
    /// Producer to subscribe to when it is listed
    pub preferred_producer: Option<String>,
    pub max_list_attempts: u32,
    pub list_retry_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval: Duration,
    pub stats_interval: Duration,
    /// Shown instead of the generic reason when playback is refused or no
    /// TURN server is available
    pub failure_message: Option<String>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            offer_mode: OfferMode::default(),
            force_turn: false,
            preferred_producer: None,
            max_list_attempts: 10,
            list_retry_interval: Duration::from_secs(2),
            max_reconnect_attempts: 3,
            reconnect_interval: Duration::from_secs(2),
            stats_interval: Duration::from_secs(1),
            failure_message: None,
        }
    }
}

impl NegotiationConfig {
    pub fn builder() -> NegotiationConfigBuilder {
        NegotiationConfigBuilder::new()
    }
}

/// Builder for [`NegotiationConfig`]
#[derive(Debug, Clone, Default)]
pub struct NegotiationConfigBuilder {
    config: NegotiationConfig,
}

impl NegotiationConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set who creates the offer
    pub fn offer_mode(mut self, mode: OfferMode) -> Self {
        self.config.offer_mode = mode;
        self
    }

    /// Require a TURN server
    pub fn force_turn(mut self, enabled: bool) -> Self {
        self.config.force_turn = enabled;
        self
    }

    /// Subscribe to this producer when it is listed
    pub fn preferred_producer(mut self, id: &str) -> Self {
        self.config.preferred_producer = Some(id.to_string());
        self
    }

    /// Retry an empty producer list this many times, this far apart
    pub fn list_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.config.max_list_attempts = attempts.max(1);
        self.config.list_retry_interval = interval;
        self
    }

    /// Reconnect after transport loss this many times, this far apart
    pub fn reconnect(mut self, attempts: u32, interval: Duration) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self.config.reconnect_interval = interval;
        self
    }

    /// Set the statistics polling period
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.config.stats_interval = interval;
        self
    }

    /// Message to show when playback is refused or TURN is missing
    pub fn failure_message(mut self, message: &str) -> Self {
        self.config.failure_message = Some(message.to_string());
        self
    }

    pub fn build(self) -> NegotiationConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = NegotiationConfig::builder()
            .offer_mode(OfferMode::ViewerOffers)
            .force_turn(true)
            .preferred_producer("Game")
            .list_retry(0, Duration::from_millis(500))
            .build();

        assert_eq!(config.offer_mode, OfferMode::ViewerOffers);
        assert!(config.force_turn);
        assert_eq!(config.preferred_producer.as_deref(), Some("Game"));
        assert_eq!(config.max_list_attempts, 1);
        assert_eq!(config.max_reconnect_attempts, 3);
    }
}
