//! Peer identities

use pxs_core::SFU_PLAYER_ID;
use std::fmt;

/// A connected endpoint of the relay
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Peer {
    /// A rendering process, by its registered id
    Producer(String),
    /// A browser or automated client, by its relay-assigned id
    Viewer(String),
    /// The selective forwarding unit; at most one is connected
    RelayUnit,
}

impl Peer {
    /// Resolve a wire `playerId` to a subscriber
    pub fn from_player_id(id: &str) -> Self {
        if id == SFU_PLAYER_ID {
            Peer::RelayUnit
        } else {
            Peer::Viewer(id.to_string())
        }
    }

    /// The `playerId` producers know this subscriber by
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Peer::Viewer(id) => Some(id),
            Peer::RelayUnit => Some(SFU_PLAYER_ID),
            Peer::Producer(_) => None,
        }
    }

    pub fn is_subscriber(&self) -> bool {
        !matches!(self, Peer::Producer(_))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Producer(id) => write!(f, "producer {}", id),
            Peer::Viewer(id) => write!(f, "viewer {}", id),
            Peer::RelayUnit => f.write_str("SFU"),
        }
    }
}

/// Which hops a viewer's messages bypass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoutingPreference {
    pub skip_sfu: bool,
    pub skip_producer: bool,
}

impl RoutingPreference {
    /// Read `skipSFU` / `skipStreamer` flags from a connection URL query
    pub fn from_query(query: &str) -> Self {
        let mut preference = Self::default();
        for pair in query.trim_start_matches('?').split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, "true"));
            let on = !matches!(value, "false" | "0");
            match key {
                "skipSFU" | "skipSfu" => preference.skip_sfu = on,
                "skipStreamer" | "skipProducer" => preference.skip_producer = on,
                _ => {}
            }
        }
        preference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sfu_player_id_only_at_boundary() {
        assert_eq!(Peer::from_player_id("1"), Peer::RelayUnit);
        assert_eq!(Peer::from_player_id("100"), Peer::Viewer("100".into()));
        assert_eq!(Peer::RelayUnit.player_id(), Some("1"));
        assert_eq!(Peer::Producer("P1".into()).player_id(), None);
    }

    #[test]
    fn test_preference_from_query() {
        assert_eq!(RoutingPreference::from_query(""), RoutingPreference::default());
        let p = RoutingPreference::from_query("?skipSFU&foo=bar");
        assert!(p.skip_sfu);
        assert!(!p.skip_producer);
        let p = RoutingPreference::from_query("skipSFU=false&skipStreamer=1");
        assert!(!p.skip_sfu);
        assert!(p.skip_producer);
    }
}
