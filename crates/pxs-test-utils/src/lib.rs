//! Common test helpers and utilities for PXS tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - A recording [`TransportSender`] for directory and router tests
//! - A [`TestRelay`] that serves on ephemeral ports and stops on drop
//! - A [`SignallingClient`] speaking JSON over a real WebSocket

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pxs_core::SignallingMessage;
use pxs_relay::{Relay, RelayConfig, SessionDirectory};
use pxs_transport::{
    TransportError, TransportEvent, TransportReceiver, TransportSender, TransportServer,
    WebSocketReceiver, WebSocketSender, WebSocketServer, WebSocketTransport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

// ============================================================================
// Recording sender
// ============================================================================

/// Something written to a [`RecordingSender`]
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Text(String),
    Binary(Bytes),
    Close { code: u16, reason: String },
}

/// A sender that keeps everything written to it
pub struct RecordingSender {
    sent: Mutex<Vec<Recorded>>,
    connected: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.sent.lock().clone()
    }

    /// Text frames parsed as signalling messages
    pub fn messages(&self) -> Vec<SignallingMessage> {
        self.sent
            .lock()
            .iter()
            .filter_map(|r| match r {
                Recorded::Text(text) => SignallingMessage::parse(text).ok(),
                _ => None,
            })
            .collect()
    }

    /// Like [`messages`](Self::messages), clearing the record
    pub fn take_messages(&self) -> Vec<SignallingMessage> {
        let messages = self.messages();
        self.sent.lock().clear();
        messages
    }

    /// Message kinds in the order they were sent
    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages().iter().map(SignallingMessage::kind).collect()
    }

    /// Code of the close frame, if the connection was closed
    pub fn close_code(&self) -> Option<u16> {
        self.sent.lock().iter().find_map(|r| match r {
            Recorded::Close { code, .. } => Some(*code),
            _ => None,
        })
    }
}

#[async_trait]
impl TransportSender for RecordingSender {
    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        self.sent.lock().push(Recorded::Binary(data));
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(Recorded::Text(text));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_with(1000, "").await
    }

    async fn close_with(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.sent.lock().push(Recorded::Close {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Test Relay - RAII wrapper with proper cleanup
// ============================================================================

/// A relay on ephemeral ports that stops on drop
pub struct TestRelay {
    relay: Arc<Relay>,
    streamer_port: u16,
    player_port: u16,
    sfu_port: u16,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestRelay {
    /// Start a relay with default configuration
    pub async fn start() -> Self {
        Self::start_with_config(RelayConfig::default()).await
    }

    /// Start a relay with custom configuration; ports and host are replaced
    pub async fn start_with_config(mut config: RelayConfig) -> Self {
        config.host = "127.0.0.1".to_string();

        let producers = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
        let viewers = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
        let relay_units = WebSocketServer::bind("127.0.0.1:0").await.unwrap();

        config.streamer_port = producers.local_addr().unwrap().port();
        config.player_port = viewers.local_addr().unwrap().port();
        config.sfu_port = relay_units.local_addr().unwrap().port();

        let streamer_port = config.streamer_port;
        let player_port = config.player_port;
        let sfu_port = config.sfu_port;

        let relay = Arc::new(Relay::new(config));
        let serving = relay.clone();
        let handle = tokio::spawn(async move {
            let _ = tokio::try_join!(
                serving.serve_producers_on(producers),
                serving.serve_viewers_on(viewers),
                serving.serve_relay_units_on(relay_units),
            );
        });

        Self {
            relay,
            streamer_port,
            player_port,
            sfu_port,
            handle: Some(handle),
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        self.relay.directory()
    }

    pub fn streamer_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.streamer_port)
    }

    pub fn player_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.player_port)
    }

    pub fn sfu_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.sfu_port)
    }

    /// Connect as a producer
    pub async fn connect_producer(&self) -> SignallingClient {
        SignallingClient::connect(&self.streamer_url()).await
    }

    /// Connect as a viewer, with an optional query string such as `skipSFU`
    pub async fn connect_viewer(&self, query: Option<&str>) -> SignallingClient {
        match query {
            Some(query) => SignallingClient::connect(&format!("{}/?{}", self.player_url(), query)).await,
            None => SignallingClient::connect(&self.player_url()).await,
        }
    }

    /// Connect as the SFU
    pub async fn connect_sfu(&self) -> SignallingClient {
        SignallingClient::connect(&self.sfu_url()).await
    }

    /// Stop the relay explicitly (also happens on drop)
    pub fn stop(&mut self) {
        self.relay.stop();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Signalling client
// ============================================================================

/// A JSON signalling peer over a real WebSocket
pub struct SignallingClient {
    sender: WebSocketSender,
    receiver: WebSocketReceiver,
}

impl SignallingClient {
    pub async fn connect(url: &str) -> Self {
        let (sender, receiver) = WebSocketTransport::connect_with_config(url, &Default::default())
            .await
            .unwrap();
        Self { sender, receiver }
    }

    pub async fn send(&self, msg: &SignallingMessage) {
        self.sender.send_text(msg.to_json().unwrap()).await.unwrap();
    }

    /// Send raw text, valid JSON or not
    pub async fn send_raw(&self, text: &str) {
        self.sender.send_text(text.to_string()).await.unwrap();
    }

    /// Next signalling message, or `None` on close or timeout
    pub async fn recv(&mut self) -> Option<SignallingMessage> {
        loop {
            match timeout(DEFAULT_TIMEOUT, self.receiver.recv()).await {
                Ok(Some(TransportEvent::Text(text))) => return SignallingMessage::parse(&text).ok(),
                Ok(Some(TransportEvent::Connected)) => continue,
                Ok(Some(TransportEvent::Disconnected { .. })) | Ok(None) | Err(_) => return None,
                Ok(Some(_)) => continue,
            }
        }
    }

    /// Skip messages until one of `kind` arrives
    pub async fn expect(&mut self, kind: &str) -> SignallingMessage {
        loop {
            match self.recv().await {
                Some(msg) if msg.kind() == kind => return msg,
                Some(_) => continue,
                None => panic!("connection ended while waiting for {}", kind),
            }
        }
    }

    /// Wait for the relay to close this connection; returns the close code
    pub async fn closed(&mut self) -> Option<u16> {
        loop {
            match timeout(DEFAULT_TIMEOUT, self.receiver.recv()).await {
                Ok(Some(TransportEvent::Disconnected { code, .. })) => return code,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return None,
            }
        }
    }

    pub async fn close(&self) {
        let _ = self.sender.close().await;
    }
}
