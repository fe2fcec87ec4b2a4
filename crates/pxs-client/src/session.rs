//! Signalling session
//!
//! Connects a [`NegotiationSequencer`] to the relay's viewer endpoint and
//! feeds it signalling messages, peer events and transport loss. After a
//! loss from `Connected` the session reconnects on its own. Once the
//! negotiation fails or is closed the signalling connection is closed too,
//! so the relay frees the viewer's slot.

use async_trait::async_trait;
use parking_lot::RwLock;
use pxs_core::SignallingMessage;
use pxs_transport::{
    Transport, TransportEvent, TransportReceiver, TransportSender, WebSocketReceiver, WebSocketSender,
    WebSocketTransport,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::builder::NegotiationConfig;
use crate::error::{ClientError, Result};
use crate::peer::{PeerConnectionFactory, PeerEvent, SessionObserver, SignallingSink};
use crate::sequencer::NegotiationSequencer;
use crate::state::NegotiationState;

const PEER_EVENT_CAPACITY: usize = 256;

/// [`SignallingSink`] over whichever transport is currently connected
#[derive(Default)]
pub struct TransportSink {
    sender: RwLock<Option<Arc<dyn TransportSender>>>,
}

impl TransportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sender: Arc<dyn TransportSender>) {
        *self.sender.write() = Some(sender);
    }

    pub fn detach(&self) -> Option<Arc<dyn TransportSender>> {
        self.sender.write().take()
    }
}

#[async_trait]
impl SignallingSink for TransportSink {
    async fn send(&self, msg: SignallingMessage) -> Result<()> {
        let sender = self.sender.read().clone().ok_or(ClientError::NotConnected)?;
        debug!("Sending {}", msg.kind());
        sender.send_text(msg.to_json()?).await?;
        Ok(())
    }
}

/// A running viewer session
pub struct Session {
    peer_events: mpsc::Sender<PeerEvent>,
    close: mpsc::Sender<()>,
    state: watch::Receiver<NegotiationState>,
    handle: Option<JoinHandle<()>>,
}

impl Session {
    /// Connect to a relay viewer endpoint and start negotiating
    pub async fn connect(
        url: &str,
        config: NegotiationConfig,
        factory: Arc<dyn PeerConnectionFactory>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self> {
        let (sender, receiver) = WebSocketTransport::connect(url).await?;
        info!("Connected to relay at {}", url);

        let sink = Arc::new(TransportSink::new());
        sink.attach(Arc::new(sender));

        let mut sequencer = NegotiationSequencer::new(config, factory, sink.clone(), observer);
        sequencer.start();
        let state = sequencer.subscribe();

        let (peer_events, peer_rx) = mpsc::channel(PEER_EVENT_CAPACITY);
        let (close, close_rx) = mpsc::channel(1);

        let driver = Driver {
            url: url.to_string(),
            sequencer,
            sink,
            peer_rx,
            close_rx,
        };
        let handle = tokio::spawn(driver.run(receiver));

        Ok(Self {
            peer_events,
            close,
            state,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> NegotiationState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<NegotiationState> {
        self.state.clone()
    }

    /// Wait until the state satisfies `done`; returns that state
    pub async fn wait_until<F>(&self, done: F) -> Result<NegotiationState>
    where
        F: FnMut(&NegotiationState) -> bool,
    {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(done)
            .await
            .map_err(|_| ClientError::NotConnected)?;
        let reached = (*reached).clone();
        Ok(reached)
    }

    /// Channel the platform reports peer connection events on
    pub fn peer_events(&self) -> mpsc::Sender<PeerEvent> {
        self.peer_events.clone()
    }

    /// Close the peer and the signalling connection; no reconnect follows
    pub async fn close(mut self) {
        let _ = self.close.send(()).await;
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

enum Step {
    Close,
    Peer(PeerEvent),
    Signal(Option<TransportEvent>),
    RetryList,
}

enum Reconnect {
    Close,
    Done(pxs_transport::Result<(WebSocketSender, WebSocketReceiver)>),
}

struct Driver {
    url: String,
    sequencer: NegotiationSequencer,
    sink: Arc<TransportSink>,
    peer_rx: mpsc::Receiver<PeerEvent>,
    close_rx: mpsc::Receiver<()>,
}

impl Driver {
    async fn run(mut self, mut receiver: WebSocketReceiver) {
        loop {
            let retry_at = self.sequencer.list_retry_at();
            let step = tokio::select! {
                biased;
                Some(()) = self.close_rx.recv() => Step::Close,
                Some(event) = self.peer_rx.recv() => Step::Peer(event),
                event = receiver.recv() => Step::Signal(event),
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => Step::RetryList,
            };

            match step {
                Step::Close => {
                    self.sequencer.close().await;
                    self.hang_up().await;
                    break;
                }
                Step::Peer(event) => {
                    if let Err(e) = self.sequencer.handle_peer_event(event).await {
                        debug!("Peer event failed: {}", e);
                    }
                }
                Step::RetryList => {
                    if let Err(e) = self.sequencer.retry_producer_list().await {
                        debug!("Producer list retry failed: {}", e);
                    }
                }
                Step::Signal(Some(TransportEvent::Text(text))) => match SignallingMessage::parse(&text) {
                    Ok(msg) => {
                        if let Err(e) = self.sequencer.handle_message(msg).await {
                            debug!("Signalling message failed: {}", e);
                        }
                    }
                    Err(e) => warn!("Unparseable message from relay: {}", e),
                },
                Step::Signal(Some(TransportEvent::Disconnected { code, reason })) => {
                    info!("Relay connection closed ({:?})", code);
                    match self.recover(reason).await {
                        Some(next) => receiver = next,
                        None => break,
                    }
                }
                Step::Signal(None) => match self.recover(None).await {
                    Some(next) => receiver = next,
                    None => break,
                },
                Step::Signal(Some(_)) => {}
            }

            if self.sequencer.state().is_terminal() {
                info!("Negotiation ended: {}", self.sequencer.state());
                self.hang_up().await;
                break;
            }
        }
        debug!("Session driver stopped in state {}", self.sequencer.state());
    }

    /// Close the signalling connection, if one is attached
    async fn hang_up(&mut self) {
        if let Some(sender) = self.sink.detach() {
            let _ = sender.close().await;
        }
    }

    /// Reconnect while the sequencer asks for it; a close request ends it
    async fn recover(&mut self, reason: Option<String>) -> Option<WebSocketReceiver> {
        self.sink.detach();
        let mut reason = reason;

        while self.sequencer.handle_transport_closed(reason.take()).await {
            let url = self.url.clone();
            let interval = self.sequencer.config().reconnect_interval;
            let attempt = async move {
                tokio::time::sleep(interval).await;
                WebSocketTransport::connect(&url).await
            };

            let outcome = tokio::select! {
                biased;
                Some(()) = self.close_rx.recv() => Reconnect::Close,
                result = attempt => Reconnect::Done(result),
            };

            match outcome {
                Reconnect::Close => {
                    self.sequencer.close().await;
                    return None;
                }
                Reconnect::Done(Ok((sender, receiver))) => {
                    self.sink.attach(Arc::new(sender));
                    self.sequencer.handle_reconnected();
                    return Some(receiver);
                }
                Reconnect::Done(Err(e)) => {
                    warn!("Reconnect to {} failed: {}", self.url, e);
                    reason = Some(e.to_string());
                }
            }
        }
        None
    }
}
