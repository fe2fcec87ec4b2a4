//! Session directory
//!
//! Owns every connected peer and every subscription edge. All state sits
//! behind one mutex and is never handed out; operations return the
//! [`Delivery`] values they produce, and callers write them with
//! [`deliver`] after the lock is gone.

use parking_lot::Mutex;
use pxs_core::{SignallingMessage, SFU_PLAYER_ID};
use pxs_transport::TransportSender;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{RelayConfig, SubscribeFallback};
use crate::error::{RelayError, Result};
use crate::matchmaker::RelayStatus;
use crate::peer::{Peer, RoutingPreference};

/// What a delivery does to its target connection
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

/// A pending write to one peer, produced under the directory lock
pub struct Delivery {
    pub target: Peer,
    pub outgoing: Outgoing,
    sender: Arc<dyn TransportSender>,
}

impl Delivery {
    fn message(target: Peer, sender: &Arc<dyn TransportSender>, msg: &SignallingMessage) -> Result<Self> {
        Ok(Self {
            target,
            outgoing: Outgoing::Text(msg.to_json()?),
            sender: sender.clone(),
        })
    }

    fn close(target: Peer, sender: &Arc<dyn TransportSender>, code: u16, reason: &str) -> Self {
        Self {
            target,
            outgoing: Outgoing::Close {
                code,
                reason: reason.to_string(),
            },
            sender: sender.clone(),
        }
    }

    /// Parsed message, for text deliveries
    pub fn message_json(&self) -> Option<SignallingMessage> {
        match &self.outgoing {
            Outgoing::Text(text) => SignallingMessage::parse(text).ok(),
            Outgoing::Close { .. } => None,
        }
    }

    /// Write to the target; failures are logged
    pub async fn send(self) {
        let result = match self.outgoing {
            Outgoing::Text(text) => self.sender.send_text(text).await,
            Outgoing::Close { code, reason } => self.sender.close_with(code, &reason).await,
        };
        if let Err(e) = result {
            debug!("Delivery to {} failed: {}", self.target, e);
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("target", &self.target)
            .field("outgoing", &self.outgoing)
            .finish()
    }
}

/// Write deliveries in order
pub async fn deliver(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        delivery.send().await;
    }
}

struct ProducerEntry {
    sender: Arc<dyn TransportSender>,
}

struct ViewerEntry {
    sender: Arc<dyn TransportSender>,
    subscription: Option<String>,
    preference: RoutingPreference,
    has_data_channel: bool,
}

struct RelayUnitEntry {
    sender: Arc<dyn TransportSender>,
    subscription: Option<String>,
}

struct Inner {
    producers: HashMap<String, ProducerEntry>,
    /// Registration order, for listing and fallback
    producer_order: Vec<String>,
    viewers: HashMap<String, ViewerEntry>,
    relay_unit: Option<RelayUnitEntry>,
    next_viewer_id: u64,
}

impl Inner {
    fn sender_of(&self, peer: &Peer) -> Option<&Arc<dyn TransportSender>> {
        match peer {
            Peer::Producer(id) => self.producers.get(id).map(|p| &p.sender),
            Peer::Viewer(id) => self.viewers.get(id).map(|v| &v.sender),
            Peer::RelayUnit => self.relay_unit.as_ref().map(|r| &r.sender),
        }
    }

    fn subscription_slot(&mut self, peer: &Peer) -> Option<&mut Option<String>> {
        match peer {
            Peer::Viewer(id) => self.viewers.get_mut(id).map(|v| &mut v.subscription),
            Peer::RelayUnit => self.relay_unit.as_mut().map(|r| &mut r.subscription),
            Peer::Producer(_) => None,
        }
    }

    fn subscription(&self, peer: &Peer) -> Option<&str> {
        match peer {
            Peer::Viewer(id) => self.viewers.get(id)?.subscription.as_deref(),
            Peer::RelayUnit => self.relay_unit.as_ref()?.subscription.as_deref(),
            Peer::Producer(_) => None,
        }
    }

    fn has_subscribers(&self, producer: &str) -> bool {
        self.viewers
            .values()
            .any(|v| v.subscription.as_deref() == Some(producer))
            || self
                .relay_unit
                .as_ref()
                .map_or(false, |r| r.subscription.as_deref() == Some(producer))
    }

    fn unique_producer_id(&self, requested: &str) -> String {
        if !self.producers.contains_key(requested) {
            return requested.to_string();
        }
        (2..)
            .map(|n| format!("{}-{}", requested, n))
            .find(|id| !self.producers.contains_key(id))
            .unwrap_or_else(|| format!("{}-{}", requested, uuid::Uuid::new_v4()))
    }

    /// Queue a message for `target` if it is still connected
    fn push(&self, out: &mut Vec<Delivery>, target: Peer, msg: &SignallingMessage) {
        let Some(sender) = self.sender_of(&target) else {
            return;
        };
        match Delivery::message(target, sender, msg) {
            Ok(delivery) => out.push(delivery),
            Err(e) => warn!("Could not serialize {}: {}", msg.kind(), e),
        }
    }

    fn push_player_count(&self, out: &mut Vec<Delivery>) {
        let msg = SignallingMessage::PlayerCount {
            count: self.viewers.len(),
        };
        for id in self.viewers.keys() {
            self.push(out, Peer::Viewer(id.clone()), &msg);
        }
    }

    /// Next hop for a viewer's signalling: the SFU unless skipped, else
    /// its producer unless skipped
    fn viewer_hop(&self, preference: &RoutingPreference, producer: &str) -> Option<Peer> {
        if self.relay_unit.is_some() && !preference.skip_sfu {
            Some(Peer::RelayUnit)
        } else if !preference.skip_producer && self.producers.contains_key(producer) {
            Some(Peer::Producer(producer.to_string()))
        } else {
            None
        }
    }

    fn notify_player_disconnected(&self, out: &mut Vec<Delivery>, producer: &str, subscriber: &Peer) {
        if let Some(player_id) = subscriber.player_id() {
            let msg = SignallingMessage::PlayerDisconnected {
                player_id: player_id.to_string(),
            };
            self.push(out, Peer::Producer(producer.to_string()), &msg);
        }
    }
}

/// Registry of connected producers, viewers and the SFU
pub struct SessionDirectory {
    inner: Mutex<Inner>,
    max_players: usize,
    fallback: SubscribeFallback,
}

impl SessionDirectory {
    pub fn new(max_players: usize, fallback: SubscribeFallback) -> Self {
        Self {
            inner: Mutex::new(Inner {
                producers: HashMap::new(),
                producer_order: Vec::new(),
                viewers: HashMap::new(),
                relay_unit: None,
                next_viewer_id: pxs_core::FIRST_PLAYER_ID,
            }),
            max_players,
            fallback,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.max_players, config.subscribe_fallback)
    }

    // =========================================================================
    // Producers
    // =========================================================================

    /// Register a producer; a taken id gets a numeric suffix.
    ///
    /// Returns the id the producer is registered under.
    pub fn register_producer(&self, id: &str, sender: Arc<dyn TransportSender>) -> String {
        let mut inner = self.inner.lock();
        let id = inner.unique_producer_id(id);
        inner.producers.insert(id.clone(), ProducerEntry { sender });
        inner.producer_order.push(id.clone());
        info!("Producer {} registered ({} total)", id, inner.producers.len());
        id
    }

    /// Move a producer to the id it announced. Only allowed while nobody is
    /// subscribed to it.
    pub fn rename_producer(&self, current: &str, requested: &str) -> Result<String> {
        if current == requested {
            return Ok(current.to_string());
        }

        let mut inner = self.inner.lock();
        if inner.has_subscribers(current) {
            return Err(RelayError::ProducerBusy(current.to_string()));
        }
        let entry = inner
            .producers
            .remove(current)
            .ok_or_else(|| RelayError::UnknownProducer(current.to_string()))?;

        let id = inner.unique_producer_id(requested);
        inner.producers.insert(id.clone(), entry);
        if let Some(slot) = inner.producer_order.iter_mut().find(|p| *p == current) {
            *slot = id.clone();
        }
        info!("Producer {} is now {}", current, id);
        Ok(id)
    }

    /// Remove a producer and unsubscribe everything bound to it.
    ///
    /// Returns the unsubscribed viewer ids alongside the deliveries.
    pub fn unregister_producer(&self, id: &str) -> (Vec<String>, Vec<Delivery>) {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();
        let mut unsubscribed = Vec::new();

        if inner.producers.remove(id).is_none() {
            return (unsubscribed, out);
        }
        inner.producer_order.retain(|p| p != id);

        for (viewer_id, viewer) in inner.viewers.iter_mut() {
            if viewer.subscription.as_deref() == Some(id) {
                viewer.subscription = None;
                viewer.has_data_channel = false;
                unsubscribed.push(viewer_id.clone());
            }
        }
        for viewer_id in &unsubscribed {
            inner.push(&mut out, Peer::Viewer(viewer_id.clone()), &SignallingMessage::StreamerDisconnected);
        }

        let sfu_bound = inner
            .relay_unit
            .as_mut()
            .filter(|r| r.subscription.as_deref() == Some(id))
            .map(|r| r.subscription = None)
            .is_some();
        if sfu_bound {
            inner.push(&mut out, Peer::RelayUnit, &SignallingMessage::StreamerDisconnected);
        }

        info!(
            "Producer {} unregistered, {} viewers unsubscribed",
            id,
            unsubscribed.len()
        );
        (unsubscribed, out)
    }

    // =========================================================================
    // Viewers
    // =========================================================================

    /// Register a viewer under a fresh id
    pub fn register_viewer(
        &self,
        preference: RoutingPreference,
        sender: Arc<dyn TransportSender>,
    ) -> Result<String> {
        let mut inner = self.inner.lock();
        if self.max_players > 0 && inner.viewers.len() >= self.max_players {
            warn!("Viewer rejected: limit of {} reached", self.max_players);
            return Err(RelayError::CapacityExceeded(self.max_players));
        }

        let id = inner.next_viewer_id.to_string();
        inner.next_viewer_id += 1;
        inner.viewers.insert(
            id.clone(),
            ViewerEntry {
                sender,
                subscription: None,
                preference,
                has_data_channel: false,
            },
        );
        info!("Viewer {} connected ({} total)", id, inner.viewers.len());
        Ok(id)
    }

    /// Remove a viewer, telling its producer (and the SFU it went through)
    pub fn disconnect_viewer(&self, id: &str) -> Vec<Delivery> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();

        let Some(viewer) = inner.viewers.remove(id) else {
            return out;
        };

        if let Some(producer) = viewer.subscription.as_deref() {
            let peer = Peer::Viewer(id.to_string());
            inner.notify_player_disconnected(&mut out, producer, &peer);
            if inner.relay_unit.is_some() && !viewer.preference.skip_sfu {
                let msg = SignallingMessage::PlayerDisconnected {
                    player_id: id.to_string(),
                };
                inner.push(&mut out, Peer::RelayUnit, &msg);
            }
        }
        inner.push_player_count(&mut out);

        info!("Viewer {} disconnected ({} remaining)", id, inner.viewers.len());
        out
    }

    /// Record that the SFU opened data channels for a viewer
    pub fn mark_data_channel(&self, viewer_id: &str) -> bool {
        match self.inner.lock().viewers.get_mut(viewer_id) {
            Some(viewer) => {
                viewer.has_data_channel = true;
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // SFU
    // =========================================================================

    pub fn register_relay_unit(&self, sender: Arc<dyn TransportSender>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.relay_unit.is_some() {
            warn!("Second SFU rejected");
            return Err(RelayError::DuplicateSingleton);
        }
        inner.relay_unit = Some(RelayUnitEntry {
            sender,
            subscription: None,
        });
        info!("SFU connected");
        Ok(())
    }

    pub fn unregister_relay_unit(&self) -> Vec<Delivery> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();

        if let Some(unit) = inner.relay_unit.take() {
            if let Some(producer) = unit.subscription.as_deref() {
                inner.notify_player_disconnected(&mut out, producer, &Peer::RelayUnit);
            }
            info!("SFU disconnected");
        }
        out
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Bind a viewer or the SFU to a producer, replacing any previous binding
    pub fn subscribe(&self, subscriber: &Peer, producer_id: &str) -> Result<Vec<Delivery>> {
        let mut inner = self.inner.lock();
        if !subscriber.is_subscriber() || inner.sender_of(subscriber).is_none() {
            return Err(RelayError::UnknownPeer(subscriber.to_string()));
        }

        let resolved = if inner.producers.contains_key(producer_id) {
            producer_id.to_string()
        } else {
            match self.fallback {
                SubscribeFallback::Strict => {
                    warn!("{} asked for unknown producer {}", subscriber, producer_id);
                    return Err(RelayError::UnknownProducer(producer_id.to_string()));
                }
                SubscribeFallback::AnyProducer => match inner.producer_order.first() {
                    Some(first) => {
                        warn!(
                            "{} asked for unknown producer {}, using {}",
                            subscriber, producer_id, first
                        );
                        first.clone()
                    }
                    None => return Err(RelayError::UnknownProducer(producer_id.to_string())),
                },
            }
        };

        let mut out = Vec::new();

        let previous = inner.subscription_slot(subscriber).and_then(Option::take);
        if let Some(previous) = previous {
            inner.notify_player_disconnected(&mut out, &previous, subscriber);
        }

        if let Some(slot) = inner.subscription_slot(subscriber) {
            *slot = Some(resolved.clone());
        }
        if let Peer::Viewer(id) = subscriber {
            if let Some(viewer) = inner.viewers.get_mut(id) {
                viewer.has_data_channel = false;
            }
        }

        match subscriber {
            Peer::RelayUnit => {
                let msg = SignallingMessage::PlayerConnected {
                    player_id: SFU_PLAYER_ID.to_string(),
                    data_channel: true,
                    sfu: true,
                };
                inner.push(&mut out, Peer::Producer(resolved.clone()), &msg);
            }
            Peer::Viewer(id) => {
                let hop = inner
                    .viewers
                    .get(id)
                    .and_then(|viewer| inner.viewer_hop(&viewer.preference, &resolved));
                match hop {
                    Some(target) => {
                        let msg = SignallingMessage::PlayerConnected {
                            player_id: id.clone(),
                            data_channel: true,
                            sfu: false,
                        };
                        inner.push(&mut out, target, &msg);
                    }
                    None => warn!("Viewer {} skips both SFU and producer, nobody told", id),
                }
            }
            Peer::Producer(_) => {}
        }
        inner.push_player_count(&mut out);

        info!("{} subscribed to {}", subscriber, resolved);
        Ok(out)
    }

    /// Drop a subscriber's binding, if any
    pub fn unsubscribe(&self, subscriber: &Peer) -> Vec<Delivery> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();

        let previous = inner.subscription_slot(subscriber).and_then(Option::take);
        if let Some(producer) = previous {
            inner.notify_player_disconnected(&mut out, &producer, subscriber);
            if let Peer::Viewer(id) = subscriber {
                if let Some(viewer) = inner.viewers.get_mut(id) {
                    viewer.has_data_channel = false;
                }
            }
            info!("{} unsubscribed from {}", subscriber, producer);
        }
        out
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Resolve where a viewer's message goes: the SFU unless skipped, else
    /// its producer unless skipped. Tags the message with the viewer's id.
    pub fn route_from_viewer(&self, viewer_id: &str, mut msg: SignallingMessage) -> Result<Delivery> {
        let inner = self.inner.lock();
        let viewer = inner
            .viewers
            .get(viewer_id)
            .ok_or_else(|| RelayError::UnknownPeer(format!("viewer {}", viewer_id)))?;
        let producer = viewer.subscription.as_deref().ok_or_else(|| {
            RelayError::RoutingFailure(format!("viewer {} is not subscribed", viewer_id))
        })?;

        msg.set_player_id(viewer_id);

        let target = inner.viewer_hop(&viewer.preference, producer).ok_or_else(|| {
            RelayError::RoutingFailure(format!(
                "viewer {} has no route to producer {}",
                viewer_id, producer
            ))
        })?;
        let sender = inner
            .sender_of(&target)
            .ok_or_else(|| RelayError::UnknownPeer(target.to_string()))?;
        Delivery::message(target, sender, &msg)
    }

    /// Resolve a `playerId` addressed message; the routing id is stripped
    pub fn route_to_subscriber(&self, player_id: &str, mut msg: SignallingMessage) -> Result<Delivery> {
        let inner = self.inner.lock();
        let target = Peer::from_player_id(player_id);
        let sender = inner
            .sender_of(&target)
            .ok_or_else(|| RelayError::UnknownPeer(target.to_string()))?;
        msg.strip_player_id();
        Delivery::message(target, sender, &msg)
    }

    /// Resolve a message from a subscriber to the producer it is bound to.
    /// Untagged messages get the subscriber's player id.
    pub fn route_to_producer(&self, subscriber: &Peer, mut msg: SignallingMessage) -> Result<Delivery> {
        let inner = self.inner.lock();
        let producer = inner
            .subscription(subscriber)
            .ok_or_else(|| RelayError::RoutingFailure(format!("{} is not subscribed", subscriber)))?
            .to_string();
        let target = Peer::Producer(producer);
        let sender = inner
            .sender_of(&target)
            .ok_or_else(|| RelayError::RoutingFailure(format!("{} is gone", target)))?;
        if msg.player_id().is_none() {
            if let Some(player_id) = subscriber.player_id() {
                msg.set_player_id(player_id);
            }
        }
        Delivery::message(target, sender, &msg)
    }

    /// Message for a peer itself (replies, config)
    pub fn reply(&self, peer: &Peer, msg: &SignallingMessage) -> Result<Delivery> {
        let inner = self.inner.lock();
        let sender = inner
            .sender_of(peer)
            .ok_or_else(|| RelayError::UnknownPeer(peer.to_string()))?;
        Delivery::message(peer.clone(), sender, msg)
    }

    /// Message for the SFU, if one is connected
    pub fn to_relay_unit(&self, msg: &SignallingMessage) -> Option<Delivery> {
        self.reply(&Peer::RelayUnit, msg).ok()
    }

    /// Close a peer's connection with a code
    pub fn kick(&self, peer: &Peer, code: u16, reason: &str) -> Option<Delivery> {
        let inner = self.inner.lock();
        let sender = inner.sender_of(peer)?;
        info!("Closing {} ({}): {}", peer, code, reason);
        Some(Delivery::close(peer.clone(), sender, code, reason))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Producer ids in registration order
    pub fn producer_ids(&self) -> Vec<String> {
        self.inner.lock().producer_order.clone()
    }

    pub fn producer_count(&self) -> usize {
        self.inner.lock().producers.len()
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.lock().viewers.len()
    }

    pub fn subscription_of(&self, subscriber: &Peer) -> Option<String> {
        self.inner.lock().subscription(subscriber).map(str::to_string)
    }

    /// Subscribers currently bound to a producer
    pub fn subscribers_of(&self, producer: &str) -> Vec<Peer> {
        let inner = self.inner.lock();
        let mut peers: Vec<Peer> = inner
            .viewers
            .iter()
            .filter(|(_, v)| v.subscription.as_deref() == Some(producer))
            .map(|(id, _)| Peer::Viewer(id.clone()))
            .collect();
        if inner.subscription(&Peer::RelayUnit) == Some(producer) {
            peers.push(Peer::RelayUnit);
        }
        peers
    }

    pub fn has_data_channel(&self, viewer_id: &str) -> bool {
        self.inner
            .lock()
            .viewers
            .get(viewer_id)
            .map_or(false, |v| v.has_data_channel)
    }

    pub fn relay_unit_connected(&self) -> bool {
        self.inner.lock().relay_unit.is_some()
    }
}

impl RelayStatus for SessionDirectory {
    fn producer_ready(&self) -> bool {
        !self.inner.lock().producers.is_empty()
    }

    fn any_viewer_connected(&self) -> bool {
        !self.inner.lock().viewers.is_empty()
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new(0, SubscribeFallback::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pxs_test_utils::RecordingSender;

    fn kinds(deliveries: &[Delivery]) -> Vec<(Peer, &'static str)> {
        deliveries
            .iter()
            .filter_map(|d| d.message_json().map(|m| (d.target.clone(), m.kind())))
            .collect()
    }

    #[test]
    fn test_duplicate_producer_ids_suffixed() {
        let directory = SessionDirectory::default();
        assert_eq!(directory.register_producer("P", RecordingSender::new()), "P");
        assert_eq!(directory.register_producer("P", RecordingSender::new()), "P-2");
        assert_eq!(directory.register_producer("P", RecordingSender::new()), "P-3");
        assert_eq!(directory.producer_ids(), vec!["P", "P-2", "P-3"]);
    }

    #[test]
    fn test_viewer_ids_start_at_100() {
        let directory = SessionDirectory::default();
        let a = directory.register_viewer(RoutingPreference::default(), RecordingSender::new()).unwrap();
        let b = directory.register_viewer(RoutingPreference::default(), RecordingSender::new()).unwrap();
        assert_eq!(a, "100");
        assert_eq!(b, "101");
    }

    #[test]
    fn test_subscription_exclusive() {
        let directory = SessionDirectory::default();
        directory.register_producer("P1", RecordingSender::new());
        directory.register_producer("P2", RecordingSender::new());
        let v = directory.register_viewer(RoutingPreference::default(), RecordingSender::new()).unwrap();
        let viewer = Peer::Viewer(v.clone());

        directory.subscribe(&viewer, "P1").unwrap();
        let out = directory.subscribe(&viewer, "P2").unwrap();

        assert_eq!(directory.subscription_of(&viewer).as_deref(), Some("P2"));
        assert_eq!(directory.subscribers_of("P1"), vec![]);
        assert_eq!(
            kinds(&out),
            vec![
                (Peer::Producer("P1".into()), "playerDisconnected"),
                (Peer::Producer("P2".into()), "playerConnected"),
                (viewer.clone(), "playerCount"),
            ]
        );
    }

    #[test]
    fn test_strict_fallback_rejects_unknown() {
        let directory = SessionDirectory::new(0, SubscribeFallback::Strict);
        directory.register_producer("P1", RecordingSender::new());
        let v = directory.register_viewer(RoutingPreference::default(), RecordingSender::new()).unwrap();

        let err = directory.subscribe(&Peer::Viewer(v), "nope").unwrap_err();
        assert!(matches!(err, RelayError::UnknownProducer(ref id) if id == "nope"));
    }

    #[test]
    fn test_any_producer_fallback() {
        let directory = SessionDirectory::default();
        let v = directory.register_viewer(RoutingPreference::default(), RecordingSender::new()).unwrap();
        let viewer = Peer::Viewer(v);

        assert!(directory.subscribe(&viewer, "nope").is_err());

        directory.register_producer("P1", RecordingSender::new());
        directory.subscribe(&viewer, "nope").unwrap();
        assert_eq!(directory.subscription_of(&viewer).as_deref(), Some("P1"));
    }

    #[test]
    fn test_capacity() {
        let directory = SessionDirectory::new(1, SubscribeFallback::AnyProducer);
        directory.register_viewer(RoutingPreference::default(), RecordingSender::new()).unwrap();
        let err = directory
            .register_viewer(RoutingPreference::default(), RecordingSender::new())
            .unwrap_err();
        assert!(matches!(err, RelayError::CapacityExceeded(1)));
        assert_eq!(err.close_code(), Some(1013));
    }

    #[test]
    fn test_rename_only_without_subscribers() {
        let directory = SessionDirectory::default();
        let id = directory.register_producer("tmp", RecordingSender::new());
        let id = directory.rename_producer(&id, "Game").unwrap();
        assert_eq!(id, "Game");

        let v = directory.register_viewer(RoutingPreference::default(), RecordingSender::new()).unwrap();
        directory.subscribe(&Peer::Viewer(v), "Game").unwrap();
        assert!(matches!(
            directory.rename_producer("Game", "Other"),
            Err(RelayError::ProducerBusy(_))
        ));
    }

    #[test]
    fn test_viewer_needs_subscription_to_route() {
        let directory = SessionDirectory::default();
        directory.register_producer("P1", RecordingSender::new());
        let v = directory.register_viewer(RoutingPreference::default(), RecordingSender::new()).unwrap();

        let offer = SignallingMessage::Offer {
            sdp: "v=0".into(),
            player_id: None,
            sfu: None,
        };
        assert!(matches!(
            directory.route_from_viewer(&v, offer),
            Err(RelayError::RoutingFailure(_))
        ));
    }
}
