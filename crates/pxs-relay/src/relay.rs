//! Relay server
//!
//! Accepts producers, viewers and the SFU on three listeners, registers each
//! connection in the shared [`SessionDirectory`] and feeds its text frames to
//! the [`Router`].

use parking_lot::RwLock;
use pxs_core::{close_code, SignallingMessage};
use pxs_transport::{TransportEvent, TransportReceiver, TransportSender, TransportServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(feature = "websocket")]
use pxs_transport::WebSocketServer;

use crate::config::RelayConfig;
use crate::directory::{deliver, SessionDirectory};
use crate::error::{RelayError, Result};
use crate::matchmaker::{MatchmakerClient, MatchmakerEvent, RelayStatus};
use crate::peer::{Peer, RoutingPreference};
use crate::router::Router;

/// Signalling relay
pub struct Relay {
    config: RelayConfig,
    directory: Arc<SessionDirectory>,
    router: Router,
    matchmaker: Option<Arc<MatchmakerClient>>,
    running: Arc<RwLock<bool>>,
}

impl Relay {
    /// Create a relay. With the matchmaker enabled this starts the link, so
    /// it must be called inside a Tokio runtime.
    pub fn new(config: RelayConfig) -> Self {
        let directory = Arc::new(SessionDirectory::from_config(&config));
        let matchmaker = config.matchmaker.enabled.then(|| {
            let status: Arc<dyn RelayStatus> = directory.clone();
            Arc::new(MatchmakerClient::spawn(config.matchmaker.clone(), status))
        });

        Self {
            router: Router::new(directory.clone()),
            directory,
            config,
            matchmaker,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Stop accepting connections
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    /// Stop accepting connections and close the matchmaker link
    pub async fn shutdown(&self) {
        self.stop();
        if let Some(matchmaker) = &self.matchmaker {
            matchmaker.shutdown().await;
            info!("Matchmaker link closed");
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Bind all three listeners from the configuration and serve them
    #[cfg(feature = "websocket")]
    pub async fn serve(&self) -> Result<()> {
        let producers = WebSocketServer::bind(&self.config.streamer_addr()).await?;
        let viewers = WebSocketServer::bind(&self.config.player_addr()).await?;
        let relay_units = WebSocketServer::bind(&self.config.sfu_addr()).await?;

        info!(
            "Relay listening: producers {}, viewers {}, SFU {}",
            self.config.streamer_addr(),
            self.config.player_addr(),
            self.config.sfu_addr()
        );

        tokio::try_join!(
            self.serve_producers_on(producers),
            self.serve_viewers_on(viewers),
            self.serve_relay_units_on(relay_units),
        )?;
        Ok(())
    }

    /// Accept producers on any transport server
    pub async fn serve_producers_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        *self.running.write() = true;

        while *self.running.read() {
            match server.accept().await {
                Ok((sender, receiver, addr)) => {
                    info!("Producer connection from {}", addr);
                    self.handle_producer(Arc::new(sender), receiver, addr);
                }
                Err(e) => error!("Producer accept error: {}", e),
            }
        }
        Ok(())
    }

    /// Accept viewers; routing preferences come from the connection URL
    #[cfg(feature = "websocket")]
    pub async fn serve_viewers_on(&self, mut server: WebSocketServer) -> Result<()> {
        *self.running.write() = true;

        while *self.running.read() {
            match server.accept_request().await {
                Ok((sender, receiver, addr, target)) => {
                    let query = target.split_once('?').map_or("", |(_, q)| q);
                    let preference = RoutingPreference::from_query(query);
                    info!("Viewer connection from {} ({:?})", addr, preference);
                    self.handle_viewer(Arc::new(sender), receiver, addr, preference);
                }
                Err(e) => error!("Viewer accept error: {}", e),
            }
        }
        Ok(())
    }

    /// Accept SFU connections on any transport server
    pub async fn serve_relay_units_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        *self.running.write() = true;

        while *self.running.read() {
            match server.accept().await {
                Ok((sender, receiver, addr)) => {
                    info!("SFU connection from {}", addr);
                    self.handle_relay_unit(Arc::new(sender), receiver, addr);
                }
                Err(e) => error!("SFU accept error: {}", e),
            }
        }
        Ok(())
    }

    // =========================================================================
    // Connections
    // =========================================================================

    fn config_message(&self) -> SignallingMessage {
        SignallingMessage::Config {
            peer_connection_options: self.config.peer_connection_options.clone(),
        }
    }

    fn handle_producer(
        &self,
        sender: Arc<dyn TransportSender>,
        receiver: impl TransportReceiver + 'static,
        addr: SocketAddr,
    ) {
        let directory = Arc::clone(&self.directory);
        let router = self.router.clone();
        let matchmaker = self.matchmaker.clone();
        let config = self.config_message();

        tokio::spawn(async move {
            let generated = uuid::Uuid::new_v4().to_string();
            let id = directory.register_producer(&generated, sender.clone());
            notify(&matchmaker, MatchmakerEvent::StreamerConnected);

            send_message(&sender, &config).await;
            send_message(&sender, &SignallingMessage::Identify).await;

            let peer = run_connection(&router, Peer::Producer(id), &sender, receiver, addr).await;

            if let Peer::Producer(id) = peer {
                let (unsubscribed, deliveries) = directory.unregister_producer(&id);
                debug!("Producer {} left {} viewers", id, unsubscribed.len());
                deliver(deliveries).await;
            }
            notify(&matchmaker, MatchmakerEvent::StreamerDisconnected);
        });
    }

    fn handle_viewer(
        &self,
        sender: Arc<dyn TransportSender>,
        receiver: impl TransportReceiver + 'static,
        addr: SocketAddr,
        preference: RoutingPreference,
    ) {
        let directory = Arc::clone(&self.directory);
        let router = self.router.clone();
        let matchmaker = self.matchmaker.clone();
        let config = self.config_message();

        tokio::spawn(async move {
            let id = match directory.register_viewer(preference, sender.clone()) {
                Ok(id) => id,
                Err(e) => {
                    reject(&sender, &e).await;
                    return;
                }
            };
            notify(&matchmaker, MatchmakerEvent::ClientConnected);

            send_message(&sender, &config).await;

            run_connection(&router, Peer::Viewer(id.clone()), &sender, receiver, addr).await;

            deliver(directory.disconnect_viewer(&id)).await;
            notify(&matchmaker, MatchmakerEvent::ClientDisconnected);
        });
    }

    fn handle_relay_unit(
        &self,
        sender: Arc<dyn TransportSender>,
        receiver: impl TransportReceiver + 'static,
        addr: SocketAddr,
    ) {
        let directory = Arc::clone(&self.directory);
        let router = self.router.clone();
        let config = self.config_message();

        tokio::spawn(async move {
            if let Err(e) = directory.register_relay_unit(sender.clone()) {
                reject(&sender, &e).await;
                return;
            }

            send_message(&sender, &config).await;

            run_connection(&router, Peer::RelayUnit, &sender, receiver, addr).await;

            deliver(directory.unregister_relay_unit()).await;
        });
    }
}

fn notify(matchmaker: &Option<Arc<MatchmakerClient>>, event: MatchmakerEvent) {
    if let Some(matchmaker) = matchmaker {
        matchmaker.notify(event);
    }
}

async fn send_message(sender: &Arc<dyn TransportSender>, msg: &SignallingMessage) {
    let result = match msg.to_json() {
        Ok(json) => sender.send_text(json).await.map_err(RelayError::from),
        Err(e) => Err(RelayError::from(e)),
    };
    if let Err(e) = result {
        warn!("Failed to send {}: {}", msg.kind(), e);
    }
}

async fn reject(sender: &Arc<dyn TransportSender>, error: &RelayError) {
    warn!("Connection rejected: {}", error);
    let code = error.close_code().unwrap_or(close_code::TRY_AGAIN);
    let _ = sender.close_with(code, &error.to_string()).await;
}

/// Read frames until the connection ends; returns the peer as it was last
/// known (producers may have renamed themselves)
async fn run_connection(
    router: &Router,
    mut peer: Peer,
    sender: &Arc<dyn TransportSender>,
    mut receiver: impl TransportReceiver,
    addr: SocketAddr,
) -> Peer {
    loop {
        let text = match receiver.recv().await {
            Some(TransportEvent::Text(text)) => text,
            Some(TransportEvent::Data(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Binary frame from {} is not UTF-8", peer);
                    let _ = sender.close_with(close_code::POLICY, "malformed message").await;
                    break;
                }
            },
            Some(TransportEvent::Disconnected { code, reason }) => {
                info!("{} at {} disconnected ({:?}): {:?}", peer, addr, code, reason);
                break;
            }
            Some(TransportEvent::Error(e)) => {
                debug!("Transport error from {}: {}", addr, e);
                continue;
            }
            Some(TransportEvent::Connected) => continue,
            None => break,
        };

        if let Err(e) = router.handle_text(&mut peer, &text).await {
            if let Some(code) = e.close_code() {
                let _ = sender.close_with(code, &e.to_string()).await;
            }
            break;
        }
    }
    peer
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
