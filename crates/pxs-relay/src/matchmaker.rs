//! Matchmaker link
//!
//! Keeps a TCP connection to an external allocator that tracks which relays
//! have a producer ready and which are busy. The connection is retried
//! forever; lifecycle events are best-effort and dropped while the link is
//! down, since every reconnect starts with a fresh `connect` snapshot.

use parking_lot::Mutex;
use pxs_transport::{TcpSender, TcpTransport, Transport, TransportEvent, TransportReceiver, TransportSender};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MatchmakerConfig;
use crate::error::{RelayError, Result};
use crate::task::{ScheduledTask, ShutdownSignal};

const EVENT_QUEUE_CAPACITY: usize = 64;

/// Relay state reported in the `connect` snapshot
pub trait RelayStatus: Send + Sync {
    /// At least one producer is registered
    fn producer_ready(&self) -> bool;
    /// At least one viewer is connected
    fn any_viewer_connected(&self) -> bool;
}

/// Lifecycle events forwarded to the matchmaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchmakerEvent {
    StreamerConnected,
    StreamerDisconnected,
    ClientConnected,
    ClientDisconnected,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum MatchmakerMessage {
    Connect {
        address: String,
        port: u16,
        ready: bool,
        player_connected: bool,
    },
    StreamerConnected,
    StreamerDisconnected,
    ClientConnected,
    ClientDisconnected,
    Ping,
}

impl From<MatchmakerEvent> for MatchmakerMessage {
    fn from(event: MatchmakerEvent) -> Self {
        match event {
            MatchmakerEvent::StreamerConnected => MatchmakerMessage::StreamerConnected,
            MatchmakerEvent::StreamerDisconnected => MatchmakerMessage::StreamerDisconnected,
            MatchmakerEvent::ClientConnected => MatchmakerMessage::ClientConnected,
            MatchmakerEvent::ClientDisconnected => MatchmakerMessage::ClientDisconnected,
        }
    }
}

async fn send_message(sender: &TcpSender, msg: &MatchmakerMessage) -> Result<()> {
    let json = serde_json::to_string(msg).map_err(|e| RelayError::Parse(e.to_string()))?;
    sender.send_text(json).await?;
    Ok(())
}

/// Handle to the background matchmaker link
pub struct MatchmakerClient {
    events: mpsc::Sender<MatchmakerEvent>,
    task: Mutex<Option<ScheduledTask>>,
}

impl MatchmakerClient {
    /// Start connecting; the link keeps retrying until shut down
    pub fn spawn(config: MatchmakerConfig, status: Arc<dyn RelayStatus>) -> Self {
        let (events, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let task = ScheduledTask::spawn("matchmaker", move |signal| run(config, status, rx, signal));
        Self {
            events,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue an event; never blocks, failures are only logged
    pub fn notify(&self, event: MatchmakerEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!("Matchmaker event {:?} dropped: {}", event, e);
        }
    }

    /// Stop the link and wait for it to close; later calls do nothing
    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }
    }
}

async fn run(
    config: MatchmakerConfig,
    status: Arc<dyn RelayStatus>,
    mut events: mpsc::Receiver<MatchmakerEvent>,
    mut signal: ShutdownSignal,
) {
    let addr = config.addr();

    while !signal.is_shutdown() {
        let connect = tokio::select! {
            _ = signal.wait() => break,
            result = TcpTransport::connect(&addr) => result,
        };

        match connect {
            Ok((sender, receiver)) => {
                info!("Connected to matchmaker at {}", addr);
                // Anything queued while disconnected is covered by the snapshot
                while events.try_recv().is_ok() {}

                let sender = Arc::new(sender);
                match link(&config, status.as_ref(), sender.clone(), receiver, &mut events, &mut signal)
                    .await
                {
                    Ok(()) => {
                        let _ = sender.close().await;
                        break;
                    }
                    Err(e) => warn!("Matchmaker link lost: {}", e),
                }
            }
            Err(e) => warn!("Matchmaker unavailable at {}: {}", addr, e),
        }

        tokio::select! {
            _ = signal.wait() => break,
            _ = tokio::time::sleep(config.retry_interval()) => {
                debug!("Retrying matchmaker connection");
            }
        }
    }

    info!("Matchmaker link stopped");
}

/// Drive one connection. `Ok` means shutdown, `Err` means reconnect.
async fn link(
    config: &MatchmakerConfig,
    status: &dyn RelayStatus,
    sender: Arc<TcpSender>,
    mut receiver: impl TransportReceiver,
    events: &mut mpsc::Receiver<MatchmakerEvent>,
    signal: &mut ShutdownSignal,
) -> Result<()> {
    let hello = MatchmakerMessage::Connect {
        address: config.public_address.clone(),
        port: config.public_port,
        ready: status.producer_ready(),
        player_connected: status.any_viewer_connected(),
    };
    send_message(&sender, &hello).await?;

    let keepalive_sender = sender.clone();
    let _keepalive = ScheduledTask::every("matchmaker-keepalive", config.keepalive_interval(), move || {
        let sender = keepalive_sender.clone();
        async move {
            if let Err(e) = send_message(&sender, &MatchmakerMessage::Ping).await {
                debug!("Matchmaker ping failed: {}", e);
            }
        }
    });

    loop {
        tokio::select! {
            _ = signal.wait() => return Ok(()),

            event = events.recv() => match event {
                Some(event) => {
                    debug!("Matchmaker event {:?}", event);
                    send_message(&sender, &event.into()).await?;
                }
                None => return Ok(()),
            },

            incoming = receiver.recv() => match incoming {
                Some(TransportEvent::Data(data)) => {
                    debug!("Matchmaker sent {} bytes", data.len());
                }
                Some(TransportEvent::Disconnected { .. }) | None => {
                    return Err(RelayError::MatchmakerUnavailable("connection closed".into()));
                }
                Some(TransportEvent::Error(e)) => {
                    return Err(RelayError::MatchmakerUnavailable(e));
                }
                Some(_) => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_message_shape() {
        let msg = MatchmakerMessage::Connect {
            address: "10.0.0.1".into(),
            port: 80,
            ready: true,
            player_connected: false,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "connect", "address": "10.0.0.1", "port": 80, "ready": true, "playerConnected": false})
        );
        assert_eq!(
            serde_json::to_value(MatchmakerMessage::from(MatchmakerEvent::ClientDisconnected)).unwrap(),
            json!({"type": "clientDisconnected"})
        );
        assert_eq!(
            serde_json::to_value(&MatchmakerMessage::Ping).unwrap(),
            json!({"type": "ping"})
        );
    }
}
