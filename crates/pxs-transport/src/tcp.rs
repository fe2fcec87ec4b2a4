//! TCP transport implementation
//!
//! Plain TCP carrying self-delimiting JSON documents, as spoken on the
//! matchmaker link. Outgoing payloads are written as-is; incoming bytes are
//! surfaced in the chunks they arrive in.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info};

use pxs_core::close_code;

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

/// Default channel buffer size for TCP connections
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 256;

const READ_BUFFER_SIZE: usize = 8192;

/// TCP client transport
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    type Sender = TcpSender;
    type Receiver = TcpReceiver;

    async fn connect(addr: &str) -> Result<(TcpSender, TcpReceiver)> {
        info!("Connecting to TCP: {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        let _ = stream.set_nodelay(true);

        let connected = Arc::new(Mutex::new(true));
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Bytes>(DEFAULT_CHANNEL_BUFFER_SIZE);
        let (incoming_tx, incoming_rx) = mpsc::channel::<TransportEvent>(DEFAULT_CHANNEL_BUFFER_SIZE);

        let shutdown = Arc::new(Notify::new());
        let sender = TcpSender {
            tx: outgoing_tx,
            connected: connected.clone(),
            shutdown: shutdown.clone(),
        };
        let receiver = TcpReceiver { rx: incoming_rx };

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            let _ = incoming_tx.send(TransportEvent::Connected).await;
            run_tcp_io_loop(reader, writer, outgoing_rx, incoming_tx, connected, shutdown).await;
        });

        debug!("TCP connected to {}", addr);
        Ok((sender, receiver))
    }
}

/// Shared IO loop for TCP connections
async fn run_tcp_io_loop(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut outgoing_rx: mpsc::Receiver<Bytes>,
    incoming_tx: mpsc::Sender<TransportEvent>,
    connected: Arc<Mutex<bool>>,
    shutdown: Arc<Notify>,
) {
    let mut read_buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    let disconnect = loop {
        tokio::select! {
            _ = shutdown.notified() => {
                let _ = writer.shutdown().await;
                break TransportEvent::Disconnected { code: None, reason: None };
            }

            outgoing = outgoing_rx.recv() => {
                let Some(data) = outgoing else {
                    // Sender dropped or closed
                    let _ = writer.shutdown().await;
                    break TransportEvent::Disconnected { code: None, reason: None };
                };
                if let Err(e) = writer.write_all(&data).await {
                    error!("TCP write error: {}", e);
                    break TransportEvent::Disconnected {
                        code: Some(close_code::ABNORMAL),
                        reason: Some(e.to_string()),
                    };
                }
            }

            result = reader.read_buf(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        debug!("TCP connection closed by peer");
                        break TransportEvent::Disconnected { code: None, reason: None };
                    }
                    Ok(_) => {
                        let data = read_buf.split().freeze();
                        if incoming_tx.send(TransportEvent::Data(data)).await.is_err() {
                            break TransportEvent::Disconnected { code: None, reason: None };
                        }
                    }
                    Err(e) => {
                        error!("TCP read error: {}", e);
                        let _ = incoming_tx.send(TransportEvent::Error(e.to_string())).await;
                        break TransportEvent::Disconnected {
                            code: Some(close_code::ABNORMAL),
                            reason: Some(e.to_string()),
                        };
                    }
                }
            }
        }
    };

    *connected.lock() = false;
    let _ = incoming_tx.send(disconnect).await;
}

/// TCP sender for writing messages
pub struct TcpSender {
    tx: mpsc::Sender<Bytes>,
    connected: Arc<Mutex<bool>>,
    shutdown: Arc<Notify>,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(data)
            .await
            .map_err(|_| TransportError::SendFailed("channel closed".into()))
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.send(Bytes::from(text)).await
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        self.shutdown.notify_one();
        Ok(())
    }

    async fn close_with(&self, _code: u16, _reason: &str) -> Result<()> {
        self.close().await
    }
}

/// TCP receiver for reading messages
pub struct TcpReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}
