//! Control-plane JSON envelope
//!
//! Every signalling frame is a JSON object tagged by `type`. Producers,
//! viewers and the SFU all speak the same envelope; the relay only looks at
//! the tag and at `playerId`, and forwards the rest untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// WebSocket close codes used by the relay
pub mod close_code {
    /// Malformed message
    pub const POLICY: u16 = 1008;
    /// Kicked by the producer
    pub const KICKED: u16 = 1011;
    /// Capacity reached, or a second SFU
    pub const TRY_AGAIN: u16 = 1013;
    /// Connection lost without a close frame
    pub const ABNORMAL: u16 = 1006;
}

/// A STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }

    pub fn is_turn(&self) -> bool {
        self.urls
            .iter()
            .any(|u| u.starts_with("turn:") || u.starts_with("turns:"))
    }
}

/// Peer connection options pushed to viewers in `config`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConnectionOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ice_servers: Vec<IceServer>,
    /// Any other RTCConfiguration members, passed through
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl PeerConnectionOptions {
    pub fn has_turn_server(&self) -> bool {
        self.ice_servers.iter().any(IceServer::is_turn)
    }
}

/// A signalling message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SignallingMessage {
    Config {
        #[serde(default)]
        peer_connection_options: PeerConnectionOptions,
    },
    Identify,
    EndpointId {
        id: String,
    },
    EndpointIdConfirm {
        committed_id: String,
    },
    ListStreamers,
    StreamerList {
        ids: Vec<String>,
    },
    PlayerCount {
        count: usize,
    },
    Subscribe {
        streamer_id: String,
    },
    Unsubscribe,
    PlayerConnected {
        #[serde(deserialize_with = "required_player_id")]
        player_id: String,
        #[serde(default)]
        data_channel: bool,
        #[serde(default)]
        sfu: bool,
    },
    PlayerDisconnected {
        #[serde(deserialize_with = "required_player_id")]
        player_id: String,
    },
    DisconnectPlayer {
        #[serde(deserialize_with = "required_player_id")]
        player_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    StreamerDisconnected,
    Offer {
        sdp: String,
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_player_id")]
        player_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sfu: Option<bool>,
    },
    Answer {
        sdp: String,
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_player_id")]
        player_id: Option<String>,
    },
    IceCandidate {
        candidate: Value,
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_player_id")]
        player_id: Option<String>,
    },
    DataChannelRequest {
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_player_id")]
        player_id: Option<String>,
    },
    PeerDataChannels {
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_player_id")]
        player_id: Option<String>,
        send_stream_id: u16,
        recv_stream_id: u16,
    },
    PeerDataChannelsReady {
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_player_id")]
        player_id: Option<String>,
    },
    StreamerDataChannels {
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_player_id")]
        player_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        send_stream_id: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recv_stream_id: Option<u16>,
    },
    LayerPreference {
        #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_player_id")]
        player_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spatial_layer: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temporal_layer: Option<u8>,
    },
    StartStreaming,
    StopStreaming,
    Stats {
        #[serde(default)]
        data: Value,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<u64>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<u64>,
    },
    Warning {
        message: String,
    },
}

impl SignallingMessage {
    /// Parse one text frame
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Wire value of the `type` tag
    pub fn kind(&self) -> &'static str {
        use SignallingMessage::*;
        match self {
            Config { .. } => "config",
            Identify => "identify",
            EndpointId { .. } => "endpointId",
            EndpointIdConfirm { .. } => "endpointIdConfirm",
            ListStreamers => "listStreamers",
            StreamerList { .. } => "streamerList",
            PlayerCount { .. } => "playerCount",
            Subscribe { .. } => "subscribe",
            Unsubscribe => "unsubscribe",
            PlayerConnected { .. } => "playerConnected",
            PlayerDisconnected { .. } => "playerDisconnected",
            DisconnectPlayer { .. } => "disconnectPlayer",
            StreamerDisconnected => "streamerDisconnected",
            Offer { .. } => "offer",
            Answer { .. } => "answer",
            IceCandidate { .. } => "iceCandidate",
            DataChannelRequest { .. } => "dataChannelRequest",
            PeerDataChannels { .. } => "peerDataChannels",
            PeerDataChannelsReady { .. } => "peerDataChannelsReady",
            StreamerDataChannels { .. } => "streamerDataChannels",
            LayerPreference { .. } => "layerPreference",
            StartStreaming => "startStreaming",
            StopStreaming => "stopStreaming",
            Stats { .. } => "stats",
            Ping { .. } => "ping",
            Pong { .. } => "pong",
            Warning { .. } => "warning",
        }
    }

    /// The player id this message addresses, if any
    pub fn player_id(&self) -> Option<&str> {
        use SignallingMessage::*;
        match self {
            PlayerConnected { player_id, .. }
            | PlayerDisconnected { player_id }
            | DisconnectPlayer { player_id, .. } => Some(player_id),
            Offer { player_id, .. }
            | Answer { player_id, .. }
            | IceCandidate { player_id, .. }
            | DataChannelRequest { player_id }
            | PeerDataChannels { player_id, .. }
            | PeerDataChannelsReady { player_id }
            | StreamerDataChannels { player_id, .. }
            | LayerPreference { player_id, .. } => player_id.as_deref(),
            _ => None,
        }
    }

    fn player_id_slot(&mut self) -> Option<&mut Option<String>> {
        use SignallingMessage::*;
        match self {
            Offer { player_id, .. }
            | Answer { player_id, .. }
            | IceCandidate { player_id, .. }
            | DataChannelRequest { player_id }
            | PeerDataChannels { player_id, .. }
            | PeerDataChannelsReady { player_id }
            | StreamerDataChannels { player_id, .. }
            | LayerPreference { player_id, .. } => Some(player_id),
            _ => None,
        }
    }

    /// Tag the message with the sender's player id.
    ///
    /// Returns false for kinds that carry no forwardable player id.
    pub fn set_player_id(&mut self, id: impl Into<String>) -> bool {
        match self.player_id_slot() {
            Some(slot) => {
                *slot = Some(id.into());
                true
            }
            None => false,
        }
    }

    /// Remove the routing player id before delivery to a viewer
    pub fn strip_player_id(&mut self) -> Option<String> {
        self.player_id_slot().and_then(Option::take)
    }

    pub fn with_player_id(mut self, id: impl Into<String>) -> Self {
        self.set_player_id(id);
        self
    }
}

/// Accept a single string or a list of strings
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

/// Player ids arrive as strings or numbers depending on the sender
fn optional_player_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!("invalid playerId: {}", other))),
    }
}

fn required_player_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    optional_player_id(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("playerId is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_and_field_names() {
        let msg = SignallingMessage::PlayerConnected {
            player_id: "100".into(),
            data_channel: true,
            sfu: false,
        };
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "playerConnected");
        assert_eq!(json["playerId"], "100");
        assert_eq!(json["dataChannel"], true);
    }

    #[test]
    fn test_numeric_player_id() {
        let msg = SignallingMessage::parse(r#"{"type":"answer","sdp":"v=0","playerId":101}"#).unwrap();
        assert_eq!(msg.player_id(), Some("101"));
    }

    #[test]
    fn test_unknown_type_is_parse_error() {
        assert!(matches!(
            SignallingMessage::parse(r#"{"type":"teleport"}"#),
            Err(Error::Parse(_))
        ));
        assert!(SignallingMessage::parse("not json").is_err());
    }

    #[test]
    fn test_set_and_strip_player_id() {
        let mut msg = SignallingMessage::IceCandidate {
            candidate: serde_json::json!({"candidate": "a=1"}),
            player_id: None,
        };
        assert!(msg.set_player_id("100"));
        assert_eq!(msg.player_id(), Some("100"));
        assert_eq!(msg.strip_player_id().as_deref(), Some("100"));
        assert_eq!(msg.player_id(), None);

        let mut list = SignallingMessage::ListStreamers;
        assert!(!list.set_player_id("100"));
    }

    #[test]
    fn test_ice_servers() {
        let options: PeerConnectionOptions = serde_json::from_str(
            r#"{"iceServers":[{"urls":"stun:stun.example.org"},{"urls":["turn:t.example.org"],"username":"u","credential":"c"}],"bundlePolicy":"max-bundle"}"#,
        )
        .unwrap();
        assert_eq!(options.ice_servers.len(), 2);
        assert!(options.has_turn_server());
        assert_eq!(options.extra["bundlePolicy"], "max-bundle");

        let stun_only = PeerConnectionOptions {
            ice_servers: vec![IceServer::new("stun:stun.example.org")],
            ..Default::default()
        };
        assert!(!stun_only.has_turn_server());
    }

    #[test]
    fn test_kind_matches_tag() {
        for msg in [
            SignallingMessage::ListStreamers,
            SignallingMessage::StreamerDisconnected,
            SignallingMessage::Ping { time: Some(5) },
            SignallingMessage::PeerDataChannels {
                player_id: None,
                send_stream_id: 1,
                recv_stream_id: 2,
            },
        ] {
            let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
            assert_eq!(json["type"], msg.kind());
        }
    }
}
