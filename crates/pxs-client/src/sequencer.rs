//! Negotiation sequencer
//!
//! Drives one viewer's offer/answer/ICE exchange with a producer, directly
//! or through an SFU. It reacts to three inputs: signalling messages from the
//! relay, events from the platform peer connection, and transport loss.
//! Every state change is published on a watch channel and to the observer.

use pxs_core::{PeerConnectionOptions, SignallingMessage};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::builder::{NegotiationConfig, OfferMode};
use crate::error::{ClientError, Result};
use crate::peer::{
    DataChannelInit, PeerConnection, PeerConnectionFactory, PeerEvent, SessionDescription,
    SessionObserver, SignallingSink,
};
use crate::state::NegotiationState;
use crate::stats::StatsPoll;

const DATA_CHANNEL_LABEL: &str = "datachannel";

pub struct NegotiationSequencer {
    config: NegotiationConfig,
    factory: Arc<dyn PeerConnectionFactory>,
    sink: Arc<dyn SignallingSink>,
    observer: Arc<dyn SessionObserver>,
    state: watch::Sender<NegotiationState>,
    peer: Option<Arc<dyn PeerConnection>>,
    /// Options from the last `config`, reused when a producer goes away
    options: Option<PeerConnectionOptions>,
    /// Remote candidates that arrived before the remote description
    pending_candidates: Vec<Value>,
    remote_description_set: bool,
    via_sfu: bool,
    list_attempts: u32,
    /// When the next `listStreamers` is due after an empty list
    list_retry_at: Option<Instant>,
    reconnect_attempts: u32,
    closed_by_user: bool,
    stats: Option<StatsPoll>,
}

impl NegotiationSequencer {
    pub fn new(
        config: NegotiationConfig,
        factory: Arc<dyn PeerConnectionFactory>,
        sink: Arc<dyn SignallingSink>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let (state, _) = watch::channel(NegotiationState::Idle);
        Self {
            config,
            factory,
            sink,
            observer,
            state,
            peer: None,
            options: None,
            pending_candidates: Vec::new(),
            remote_description_set: false,
            via_sfu: false,
            list_attempts: 0,
            list_retry_at: None,
            reconnect_attempts: 0,
            closed_by_user: false,
            stats: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state.borrow().clone()
    }

    /// Follow state changes
    pub fn subscribe(&self) -> watch::Receiver<NegotiationState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Whether negotiation went through an SFU
    pub fn via_sfu(&self) -> bool {
        self.via_sfu
    }

    /// Deadline for [`retry_producer_list`](Self::retry_producer_list), if
    /// an empty list is waiting to be asked again
    pub fn list_retry_at(&self) -> Option<Instant> {
        self.list_retry_at
    }

    /// Remote candidates still waiting for a remote description
    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    fn set_state(&self, state: NegotiationState) {
        debug!("Negotiation state: {}", state);
        self.observer.on_state_change(&state);
        self.state.send_replace(state);
    }

    fn fail(&mut self, message: String) {
        warn!("Negotiation failed: {}", message);
        self.teardown_peer_sync();
        self.set_state(NegotiationState::Failed { message });
    }

    fn teardown_peer_sync(&mut self) {
        if self.stats.take().is_some() {
            self.observer.on_input_enabled(false);
        }
        self.pending_candidates.clear();
        self.list_retry_at = None;
        self.remote_description_set = false;
        self.via_sfu = false;
    }

    async fn teardown_peer(&mut self) {
        self.teardown_peer_sync();
        if let Some(peer) = self.peer.take() {
            peer.close().await;
        }
    }

    fn peer(&self) -> Result<Arc<dyn PeerConnection>> {
        self.peer
            .clone()
            .ok_or_else(|| ClientError::NegotiationFailure("no peer connection".into()))
    }

    /// Begin; nothing is sent until the relay's `config` arrives
    pub fn start(&mut self) {
        self.closed_by_user = false;
        self.set_state(NegotiationState::AwaitingConfig);
    }

    // =========================================================================
    // Signalling input
    // =========================================================================

    /// Handle a message from the relay. A failure moves the sequencer to
    /// `Failed` and is also returned.
    pub async fn handle_message(&mut self, msg: SignallingMessage) -> Result<()> {
        if self.state.borrow().is_terminal() {
            debug!("Ignoring {} in terminal state", msg.kind());
            return Ok(());
        }

        let result = self.dispatch(msg).await;
        if let Err(e) = &result {
            let message = match e {
                ClientError::NoTurnServer => self
                    .config
                    .failure_message
                    .clone()
                    .unwrap_or_else(|| e.to_string()),
                _ => e.to_string(),
            };
            self.teardown_peer().await;
            self.fail(message);
        }
        result
    }

    async fn dispatch(&mut self, msg: SignallingMessage) -> Result<()> {
        let state = self.state();
        match msg {
            SignallingMessage::Config {
                peer_connection_options,
            } => {
                if state != NegotiationState::AwaitingConfig {
                    warn!("Unexpected config in state {}", state);
                    return Ok(());
                }
                if self.config.force_turn && !peer_connection_options.has_turn_server() {
                    return Err(ClientError::NoTurnServer);
                }
                self.options = Some(peer_connection_options);
                self.request_producers().await
            }

            SignallingMessage::StreamerList { ids } => {
                if state != NegotiationState::AwaitingProducerList {
                    debug!("Ignoring streamerList in state {}", state);
                    return Ok(());
                }
                self.on_producer_list(ids).await
            }

            SignallingMessage::Offer { sdp, sfu, .. } => {
                if state != NegotiationState::AwaitingOffer {
                    warn!("Unexpected offer in state {}", state);
                    return Ok(());
                }
                self.on_offer(sdp, sfu.unwrap_or(false)).await
            }

            SignallingMessage::Answer { sdp, .. } => {
                if state != NegotiationState::AwaitingAnswer {
                    warn!("Unexpected answer in state {}", state);
                    return Ok(());
                }
                let peer = self.peer()?;
                peer.set_remote_description(SessionDescription::answer(sdp)).await?;
                self.remote_description_set = true;
                self.flush_candidates(&peer).await?;
                self.set_state(NegotiationState::IceExchange);
                Ok(())
            }

            SignallingMessage::IceCandidate { candidate, .. } => {
                match (&self.peer, self.remote_description_set) {
                    (Some(peer), true) => peer.add_ice_candidate(candidate).await?,
                    _ => self.pending_candidates.push(candidate),
                }
                Ok(())
            }

            SignallingMessage::PeerDataChannels {
                send_stream_id,
                recv_stream_id,
                ..
            } => {
                if !(self.via_sfu && state == NegotiationState::Answering) {
                    warn!("Unexpected peerDataChannels in state {}", state);
                    return Ok(());
                }
                let peer = self.peer()?;
                peer.create_data_channel(DataChannelInit::negotiated("send-datachannel", send_stream_id))
                    .await?;
                peer.create_data_channel(DataChannelInit::negotiated("recv-datachannel", recv_stream_id))
                    .await?;
                self.sink
                    .send(SignallingMessage::PeerDataChannelsReady { player_id: None })
                    .await?;
                self.set_state(NegotiationState::DataChannelOpening);
                Ok(())
            }

            SignallingMessage::StreamerDisconnected => {
                if self.options.is_none() {
                    return Ok(());
                }
                info!("Producer went away, looking for another");
                self.teardown_peer().await;
                self.request_producers().await
            }

            SignallingMessage::PlayerCount { count } => {
                self.observer.on_player_count(count);
                Ok(())
            }

            SignallingMessage::Warning { message } => {
                warn!("Relay warning: {}", message);
                self.observer.on_warning(&message);
                Ok(())
            }

            SignallingMessage::Ping { time } => self.sink.send(SignallingMessage::Pong { time }).await,

            other => {
                debug!("Ignoring {} in state {}", other.kind(), state);
                Ok(())
            }
        }
    }

    /// Create a fresh peer and ask for the producer list
    async fn request_producers(&mut self) -> Result<()> {
        let options = self.options.clone().unwrap_or_default();
        self.peer = Some(self.factory.create(&options)?);
        self.list_attempts = 1;
        self.sink.send(SignallingMessage::ListStreamers).await?;
        self.set_state(NegotiationState::AwaitingProducerList);
        Ok(())
    }

    /// Ask for the producer list again once [`list_retry_at`](Self::list_retry_at)
    /// has passed. Does nothing unless a retry is pending.
    pub async fn retry_producer_list(&mut self) -> Result<()> {
        if self.list_retry_at.take().is_none() || self.state() != NegotiationState::AwaitingProducerList {
            return Ok(());
        }
        self.list_attempts += 1;
        let result = self.sink.send(SignallingMessage::ListStreamers).await;
        if let Err(e) = &result {
            let message = e.to_string();
            self.teardown_peer().await;
            self.fail(message);
        }
        result
    }

    async fn on_producer_list(&mut self, ids: Vec<String>) -> Result<()> {
        self.list_retry_at = None;
        if ids.is_empty() {
            if self.list_attempts >= self.config.max_list_attempts {
                return Err(ClientError::NoProducer(self.list_attempts));
            }
            debug!(
                "No producers yet (attempt {}/{})",
                self.list_attempts, self.config.max_list_attempts
            );
            self.list_retry_at = Some(Instant::now() + self.config.list_retry_interval);
            return Ok(());
        }

        let chosen = self
            .config
            .preferred_producer
            .as_ref()
            .filter(|preferred| ids.contains(preferred))
            .cloned()
            .unwrap_or_else(|| ids[0].clone());
        info!("Subscribing to {}", chosen);
        self.sink
            .send(SignallingMessage::Subscribe { streamer_id: chosen })
            .await?;

        match self.config.offer_mode {
            OfferMode::ProducerOffers => {
                self.set_state(NegotiationState::AwaitingOffer);
                Ok(())
            }
            OfferMode::ViewerOffers => {
                let peer = self.peer()?;
                peer.create_data_channel(DataChannelInit::in_band(DATA_CHANNEL_LABEL))
                    .await?;
                let sdp = peer.create_offer().await?;
                peer.set_local_description(SessionDescription::offer(sdp.clone()))
                    .await?;
                self.set_state(NegotiationState::OfferCreated);
                self.sink
                    .send(SignallingMessage::Offer {
                        sdp,
                        player_id: None,
                        sfu: None,
                    })
                    .await?;
                self.set_state(NegotiationState::AwaitingAnswer);
                Ok(())
            }
        }
    }

    async fn on_offer(&mut self, sdp: String, sfu: bool) -> Result<()> {
        let peer = self.peer()?;
        self.via_sfu = sfu;
        self.set_state(NegotiationState::OfferReceived);

        peer.set_remote_description(SessionDescription::offer(sdp)).await?;
        self.remote_description_set = true;
        self.flush_candidates(&peer).await?;

        self.set_state(NegotiationState::Answering);
        let answer = peer.create_answer().await?;
        peer.set_local_description(SessionDescription::answer(answer.clone()))
            .await?;
        self.sink
            .send(SignallingMessage::Answer {
                sdp: answer,
                player_id: None,
            })
            .await?;

        if sfu {
            self.sink
                .send(SignallingMessage::DataChannelRequest { player_id: None })
                .await?;
        } else {
            self.set_state(NegotiationState::IceExchange);
        }
        Ok(())
    }

    async fn flush_candidates(&mut self, peer: &Arc<dyn PeerConnection>) -> Result<()> {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            peer.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Peer input
    // =========================================================================

    /// Handle an event from the platform peer connection
    pub async fn handle_peer_event(&mut self, event: PeerEvent) -> Result<()> {
        let state = self.state();
        if state.is_terminal() {
            return Ok(());
        }

        match event {
            PeerEvent::IceCandidate(candidate) => {
                self.sink
                    .send(SignallingMessage::IceCandidate {
                        candidate,
                        player_id: None,
                    })
                    .await
            }
            PeerEvent::IceConnected => {
                if state == NegotiationState::IceExchange {
                    self.set_state(NegotiationState::DataChannelOpening);
                }
                Ok(())
            }
            PeerEvent::DataChannelOpen => {
                if matches!(state, NegotiationState::IceExchange | NegotiationState::DataChannelOpening) {
                    self.on_connected();
                }
                Ok(())
            }
            PeerEvent::IceFailed => {
                self.teardown_peer().await;
                self.fail("ICE connection failed".to_string());
                Err(ClientError::NegotiationFailure("ICE connection failed".into()))
            }
            PeerEvent::DataChannelClosed => {
                debug!("Data channel closed in state {}", state);
                Ok(())
            }
            PeerEvent::PlaybackRejected => {
                let message = self
                    .config
                    .failure_message
                    .clone()
                    .unwrap_or_else(|| "Playback was rejected".to_string());
                self.teardown_peer().await;
                self.fail(message.clone());
                Err(ClientError::NegotiationFailure(message))
            }
        }
    }

    fn on_connected(&mut self) {
        self.reconnect_attempts = 0;
        self.set_state(NegotiationState::Connected);
        if let Some(peer) = &self.peer {
            self.stats = Some(StatsPoll::start(
                peer.clone(),
                self.observer.clone(),
                self.config.stats_interval,
            ));
        }
        self.observer.on_input_enabled(true);
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// The signalling connection ended. Returns true when the caller should
    /// reconnect and then call [`handle_reconnected`](Self::handle_reconnected).
    pub async fn handle_transport_closed(&mut self, reason: Option<String>) -> bool {
        let state = self.state();
        if self.closed_by_user || state.is_terminal() {
            return false;
        }

        match state {
            NegotiationState::Connected | NegotiationState::Reconnecting { .. } => {
                self.teardown_peer().await;
                if self.reconnect_attempts >= self.config.max_reconnect_attempts {
                    self.fail(format!(
                        "connection lost, {} reconnect attempts failed",
                        self.reconnect_attempts
                    ));
                    return false;
                }
                self.reconnect_attempts += 1;
                info!("Signalling lost, reconnecting (attempt {})", self.reconnect_attempts);
                self.set_state(NegotiationState::Reconnecting {
                    attempt: self.reconnect_attempts,
                });
                true
            }
            _ => {
                self.teardown_peer().await;
                self.fail(reason.unwrap_or_else(|| "signalling connection closed".to_string()));
                false
            }
        }
    }

    /// A new signalling connection is up after `Reconnecting`
    pub fn handle_reconnected(&mut self) {
        if matches!(self.state(), NegotiationState::Reconnecting { .. }) {
            self.set_state(NegotiationState::AwaitingConfig);
        }
    }

    /// Stop everything; no reconnect follows
    pub async fn close(&mut self) {
        self.closed_by_user = true;
        self.teardown_peer().await;
        self.set_state(NegotiationState::Closed);
    }
}
