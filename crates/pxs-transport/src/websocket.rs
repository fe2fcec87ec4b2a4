//! WebSocket transport implementation

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    accept_hdr_async_with_config, connect_async_with_config,
    tungstenite::handshake::server::{ErrorResponse, Request, Response},
    tungstenite::protocol::{
        frame::coding::CloseCode, CloseFrame, Message as WsMessage,
        WebSocketConfig as WsProtocolConfig,
    },
    WebSocketStream,
};
use tracing::{debug, error, info};

use pxs_core::close_code;

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer};

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum message size
    pub max_message_size: usize,
    /// Capacity of the per-connection send and event queues
    pub channel_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 4 * 1024 * 1024, // 4MB
            channel_capacity: 256,
        }
    }
}

impl WebSocketConfig {
    fn protocol_config(&self) -> WsProtocolConfig {
        let mut config = WsProtocolConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config
    }
}

/// WebSocket client transport
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Connect with explicit settings
    pub async fn connect_with_config(
        url: &str,
        config: &WebSocketConfig,
    ) -> Result<(WebSocketSender, WebSocketReceiver)> {
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, response) =
            connect_async_with_config(url, Some(config.protocol_config()), false)
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        Ok(spawn_io(ws_stream, config.channel_capacity))
    }
}

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

impl WebSocketSender {
    async fn push(&self, msg: WsMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        self.push(WsMessage::Binary(data.to_vec())).await
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.push(WsMessage::Text(text)).await
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }

    async fn close_with(&self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        let _ = self.tx.send(WsMessage::Close(Some(frame))).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)> {
        Self::connect_with_config(url, &WebSocketConfig::default()).await
    }
}

/// Split a stream into writer and reader tasks bridged by channels
fn spawn_io<S>(ws_stream: WebSocketStream<S>, capacity: usize) -> (WebSocketSender, WebSocketReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(capacity);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(capacity);

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();

    // Writer task
    tokio::spawn(async move {
        while let Some(msg) = send_rx.recv().await {
            let closing = matches!(msg, WsMessage::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("WebSocket write error: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        *connected_write.lock() = false;
    });

    // Reader task
    tokio::spawn(async move {
        let _ = event_tx.send(TransportEvent::Connected).await;

        let mut disconnect = TransportEvent::Disconnected {
            code: Some(close_code::ABNORMAL),
            reason: None,
        };

        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    if event_tx.send(TransportEvent::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Binary(data)) => {
                    if event_tx.send(TransportEvent::Data(Bytes::from(data))).await.is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Close(frame)) => {
                    debug!("WebSocket closed: {:?}", frame);
                    disconnect = TransportEvent::Disconnected {
                        code: frame.as_ref().map(|f| u16::from(f.code)),
                        reason: frame.map(|f| f.reason.to_string()),
                    };
                    break;
                }
                // Ping/pong handled by tungstenite
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket read error: {}", e);
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    disconnect = TransportEvent::Disconnected {
                        code: Some(close_code::ABNORMAL),
                        reason: Some(e.to_string()),
                    };
                    break;
                }
            }
        }

        *connected_read.lock() = false;
        let _ = event_tx.send(disconnect).await;
    });

    let sender = WebSocketSender {
        tx: send_tx,
        connected,
    };
    let receiver = WebSocketReceiver { rx: event_rx };

    (sender, receiver)
}

/// WebSocket server
pub struct WebSocketServer {
    listener: tokio::net::TcpListener,
    config: WebSocketConfig,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", addr, e)))?;

        info!("WebSocket server listening on {}", addr);

        Ok(Self {
            listener,
            config: WebSocketConfig::default(),
        })
    }

    pub fn with_config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept a connection and keep the request target (path and query)
    /// the client upgraded on.
    pub async fn accept_request(
        &mut self,
    ) -> Result<(WebSocketSender, WebSocketReceiver, SocketAddr, String)> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("Accepted TCP connection from {}", addr);

        let mut target = String::from("/");
        let callback = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
            if let Some(path) = request.uri().path_and_query() {
                target = path.as_str().to_string();
            }
            Ok(response)
        };

        let ws_stream =
            accept_hdr_async_with_config(stream, callback, Some(self.config.protocol_config()))
                .await
                .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;

        debug!("WebSocket upgrade complete for {} on {}", addr, target);

        let (sender, receiver) = spawn_io(ws_stream, self.config.channel_capacity);
        Ok((sender, receiver, addr, target))
    }
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)> {
        let (sender, receiver, addr, _target) = self.accept_request().await?;
        Ok((sender, receiver, addr))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_config() {
        let config = WebSocketConfig::default();
        assert_eq!(config.protocol_config().max_message_size, Some(4 * 1024 * 1024));
    }
}
