//! Transport Layer Tests
//!
//! - WebSocket text and binary frames in both directions
//! - Close codes reported to the other side
//! - Abnormal disconnect reporting
//! - TCP link round trip

use bytes::Bytes;
use pxs_transport::{
    TcpTransport, Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer,
    WebSocketServer, WebSocketTransport,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

async fn next_payload<R: TransportReceiver>(receiver: &mut R) -> Option<TransportEvent> {
    loop {
        match timeout(Duration::from_secs(5), receiver.recv()).await {
            Ok(Some(TransportEvent::Connected)) => continue,
            Ok(event) => return event,
            Err(_) => return None,
        }
    }
}

async fn server() -> (WebSocketServer, String) {
    let server = WebSocketServer::bind("127.0.0.1:0").await.expect("bind failed");
    let url = format!("ws://{}", server.local_addr().unwrap());
    (server, url)
}

#[tokio::test]
async fn test_text_and_binary_frames() {
    let (mut server, url) = server().await;

    let accept = tokio::spawn(async move { server.accept().await });
    let (client_tx, mut client_rx) = WebSocketTransport::connect(&url).await.expect("connect failed");
    let (server_tx, mut server_rx, _addr) = accept.await.unwrap().expect("accept failed");

    client_tx
        .send_text(r#"{"type":"listStreamers"}"#.to_string())
        .await
        .unwrap();
    assert_eq!(
        next_payload(&mut server_rx).await,
        Some(TransportEvent::Text(r#"{"type":"listStreamers"}"#.to_string()))
    );

    server_tx.send(Bytes::from_static(&[72, 0, 100, 0, 200, 0])).await.unwrap();
    assert_eq!(
        next_payload(&mut client_rx).await,
        Some(TransportEvent::Data(Bytes::from_static(&[72, 0, 100, 0, 200, 0])))
    );
}

#[tokio::test]
async fn test_close_code_reaches_peer() {
    let (mut server, url) = server().await;

    let accept = tokio::spawn(async move { server.accept().await });
    let (_client_tx, mut client_rx) = WebSocketTransport::connect(&url).await.unwrap();
    let (server_tx, _server_rx, _) = accept.await.unwrap().unwrap();

    server_tx.close_with(1013, "too many players").await.unwrap();
    assert!(!server_tx.is_connected());

    match next_payload(&mut client_rx).await {
        Some(TransportEvent::Disconnected { code, reason }) => {
            assert_eq!(code, Some(1013));
            assert_eq!(reason.as_deref(), Some("too many players"));
        }
        other => panic!("Expected Disconnected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_send_after_close_fails() {
    let (mut server, url) = server().await;

    let accept = tokio::spawn(async move { server.accept().await });
    let (client_tx, _client_rx) = WebSocketTransport::connect(&url).await.unwrap();
    let _conn = accept.await.unwrap().unwrap();

    client_tx.close().await.unwrap();
    assert!(client_tx.send_text("late".into()).await.is_err());
}

#[tokio::test]
async fn test_abnormal_disconnect() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    // Complete the handshake, then drop the socket without a close frame
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(ws);
    });

    let (_tx, mut rx) = WebSocketTransport::connect(&url).await.unwrap();
    let mut code = None;
    while let Some(event) = next_payload(&mut rx).await {
        if let TransportEvent::Disconnected { code: c, .. } = event {
            code = c;
            break;
        }
    }
    assert_eq!(code, Some(1006));
}

#[tokio::test]
async fn test_tcp_round_trip() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        stream.write_all(&buf[..n]).await.unwrap();
        buf.truncate(n);
        buf
    });

    let (tx, mut rx) = TcpTransport::connect(&addr).await.expect("connect failed");
    tx.send_text(r#"{"type":"ping"}"#.to_string()).await.unwrap();

    let received = peer.await.unwrap();
    assert_eq!(received, br#"{"type":"ping"}"#.to_vec());

    match next_payload(&mut rx).await {
        Some(TransportEvent::Data(data)) => assert_eq!(&data[..], br#"{"type":"ping"}"#),
        other => panic!("Expected Data, got {:?}", other),
    }

    tx.close().await.unwrap();
    assert!(!tx.is_connected());
}

#[tokio::test]
async fn test_accept_request_keeps_query() {
    let (mut server, url) = server().await;

    let accept = tokio::spawn(async move { server.accept_request().await });
    let _client = WebSocketTransport::connect(&format!("{}/?skipSFU=true", url))
        .await
        .expect("connect failed");
    let (_tx, _rx, _addr, target) = accept.await.unwrap().expect("accept failed");

    assert_eq!(target, "/?skipSFU=true");
}
