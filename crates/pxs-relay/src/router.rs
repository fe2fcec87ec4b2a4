//! Signalling message router
//!
//! Dispatches parsed control messages by the role of the peer that sent
//! them. Routing failures are logged and the message is dropped; only a
//! message that does not parse is an error, and it ends the connection.

use pxs_core::{close_code, SignallingMessage};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::directory::{deliver, Delivery, SessionDirectory};
use crate::error::{RelayError, Result};
use crate::peer::Peer;

/// Per-role control message dispatch over a shared directory
#[derive(Clone)]
pub struct Router {
    directory: Arc<SessionDirectory>,
}

impl Router {
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    /// Handle one text frame from `peer`.
    ///
    /// A producer that renames itself has `peer` updated in place.
    pub async fn handle_text(&self, peer: &mut Peer, text: &str) -> Result<()> {
        let msg = SignallingMessage::parse(text).map_err(|e| {
            warn!("Malformed message from {}: {}", peer, e);
            RelayError::Parse(e.to_string())
        })?;
        debug!("{} -> {}", peer, msg.kind());

        let deliveries = match peer.clone() {
            Peer::Producer(_) => self.from_producer(peer, msg),
            Peer::Viewer(id) => self.from_viewer(&id, msg),
            Peer::RelayUnit => self.from_relay_unit(msg),
        };
        deliver(deliveries).await;
        Ok(())
    }

    /// Forward a viewer's message to the SFU or its producer
    pub fn forward_from_viewer(&self, viewer_id: &str, msg: SignallingMessage) -> Option<Delivery> {
        let kind = msg.kind();
        match self.directory.route_from_viewer(viewer_id, msg) {
            Ok(delivery) => Some(delivery),
            Err(e) => {
                warn!("Dropped {} from viewer {}: {}", kind, viewer_id, e);
                None
            }
        }
    }

    /// Forward a message to the subscriber addressed by `player_id`
    pub fn forward_to_viewer(&self, player_id: &str, msg: SignallingMessage) -> Option<Delivery> {
        let kind = msg.kind();
        match self.directory.route_to_subscriber(player_id, msg) {
            Ok(delivery) => Some(delivery),
            Err(e) => {
                warn!("Dropped {} for player {}: {}", kind, player_id, e);
                None
            }
        }
    }

    fn reply(&self, peer: &Peer, msg: SignallingMessage) -> Vec<Delivery> {
        match self.directory.reply(peer, &msg) {
            Ok(delivery) => vec![delivery],
            Err(e) => {
                debug!("No reply to {}: {}", peer, e);
                Vec::new()
            }
        }
    }

    fn subscribe(&self, subscriber: &Peer, streamer_id: &str) -> Vec<Delivery> {
        self.directory
            .subscribe(subscriber, streamer_id)
            .unwrap_or_else(|e| {
                warn!("Subscribe from {} failed: {}", subscriber, e);
                Vec::new()
            })
    }

    fn list_streamers(&self, peer: &Peer) -> Vec<Delivery> {
        let ids = self.directory.producer_ids();
        self.reply(peer, SignallingMessage::StreamerList { ids })
    }

    fn from_producer(&self, peer: &mut Peer, msg: SignallingMessage) -> Vec<Delivery> {
        let Peer::Producer(current) = peer.clone() else {
            return Vec::new();
        };

        match msg {
            SignallingMessage::EndpointId { id } => match self.directory.rename_producer(&current, &id) {
                Ok(committed) => {
                    *peer = Peer::Producer(committed.clone());
                    self.reply(peer, SignallingMessage::EndpointIdConfirm { committed_id: committed })
                }
                Err(e) => {
                    warn!("Producer {} cannot become {}: {}", current, id, e);
                    Vec::new()
                }
            },
            SignallingMessage::Ping { time } => self.reply(peer, SignallingMessage::Pong { time }),
            msg @ (SignallingMessage::Offer { .. }
            | SignallingMessage::Answer { .. }
            | SignallingMessage::IceCandidate { .. }) => match msg.player_id().map(str::to_string) {
                Some(player_id) => self.forward_to_viewer(&player_id, msg).into_iter().collect(),
                None => {
                    warn!("{} from producer {} has no playerId", msg.kind(), current);
                    Vec::new()
                }
            },
            SignallingMessage::DisconnectPlayer { player_id, reason } => {
                let reason = reason.unwrap_or_else(|| "kicked by producer".to_string());
                info!("Producer {} disconnects player {}: {}", current, player_id, reason);
                self.directory
                    .kick(&Peer::from_player_id(&player_id), close_code::KICKED, &reason)
                    .into_iter()
                    .collect()
            }
            msg @ SignallingMessage::LayerPreference { .. } => {
                self.directory.to_relay_unit(&msg).into_iter().collect()
            }
            other => {
                warn!("Unsupported {} from producer {}", other.kind(), current);
                Vec::new()
            }
        }
    }

    fn from_viewer(&self, viewer_id: &str, msg: SignallingMessage) -> Vec<Delivery> {
        let peer = Peer::Viewer(viewer_id.to_string());

        match msg {
            SignallingMessage::ListStreamers => self.list_streamers(&peer),
            SignallingMessage::Subscribe { streamer_id } => self.subscribe(&peer, &streamer_id),
            SignallingMessage::Unsubscribe => self.directory.unsubscribe(&peer),
            msg @ (SignallingMessage::Offer { .. }
            | SignallingMessage::Answer { .. }
            | SignallingMessage::IceCandidate { .. }
            | SignallingMessage::DataChannelRequest { .. }
            | SignallingMessage::PeerDataChannelsReady { .. }
            | SignallingMessage::LayerPreference { .. }) => {
                self.forward_from_viewer(viewer_id, msg).into_iter().collect()
            }
            SignallingMessage::Stats { data } => {
                info!("Stats from viewer {}: {}", viewer_id, data);
                Vec::new()
            }
            SignallingMessage::Ping { time } => self.reply(&peer, SignallingMessage::Pong { time }),
            other => {
                warn!("Unsupported {} from viewer {}", other.kind(), viewer_id);
                Vec::new()
            }
        }
    }

    fn from_relay_unit(&self, msg: SignallingMessage) -> Vec<Delivery> {
        let peer = Peer::RelayUnit;

        match msg {
            SignallingMessage::ListStreamers => self.list_streamers(&peer),
            SignallingMessage::Subscribe { streamer_id } => self.subscribe(&peer, &streamer_id),
            SignallingMessage::Unsubscribe => self.directory.unsubscribe(&peer),
            SignallingMessage::Ping { time } => self.reply(&peer, SignallingMessage::Pong { time }),
            msg @ (SignallingMessage::StreamerDataChannels { .. }
            | SignallingMessage::StartStreaming
            | SignallingMessage::StopStreaming) => self.to_subscribed_producer(msg),
            msg => match msg.player_id().map(str::to_string) {
                Some(player_id) => {
                    if matches!(msg, SignallingMessage::PeerDataChannels { .. }) {
                        self.directory.mark_data_channel(&player_id);
                    }
                    self.forward_to_viewer(&player_id, msg).into_iter().collect()
                }
                None if matches!(
                    msg,
                    SignallingMessage::Answer { .. } | SignallingMessage::IceCandidate { .. }
                ) =>
                {
                    self.to_subscribed_producer(msg)
                }
                None => {
                    warn!("Unsupported {} from SFU", msg.kind());
                    Vec::new()
                }
            },
        }
    }

    fn to_subscribed_producer(&self, msg: SignallingMessage) -> Vec<Delivery> {
        let kind = msg.kind();
        match self.directory.route_to_producer(&Peer::RelayUnit, msg) {
            Ok(delivery) => vec![delivery],
            Err(e) => {
                warn!("Dropped {} from SFU: {}", kind, e);
                Vec::new()
            }
        }
    }
}
