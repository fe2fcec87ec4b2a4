//! Relay End-to-End Tests
//!
//! Real WebSocket connections against a relay on ephemeral ports:
//! - Producer handshake and renaming
//! - One producer, one viewer: subscribe, offer/answer, producer loss
//! - SFU topology and data channel setup
//! - Close codes for malformed input, capacity and a second SFU

use pxs_core::SignallingMessage;
use pxs_relay::{Peer, RelayConfig};
use pxs_test_utils::{wait_for, TestRelay, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT};
use serde_json::json;

#[tokio::test]
async fn test_producer_handshake() {
    let relay = TestRelay::start().await;
    let mut producer = relay.connect_producer().await;

    producer.expect("config").await;
    producer.expect("identify").await;

    producer
        .send(&SignallingMessage::EndpointId { id: "Game".into() })
        .await;
    assert_eq!(
        producer.expect("endpointIdConfirm").await,
        SignallingMessage::EndpointIdConfirm {
            committed_id: "Game".into()
        }
    );
    assert_eq!(relay.directory().producer_ids(), vec!["Game"]);

    producer.send(&SignallingMessage::Ping { time: Some(42) }).await;
    assert_eq!(
        producer.expect("pong").await,
        SignallingMessage::Pong { time: Some(42) }
    );
}

#[tokio::test]
async fn test_single_producer_single_viewer() {
    let relay = TestRelay::start().await;

    let mut producer = relay.connect_producer().await;
    producer.expect("identify").await;
    producer
        .send(&SignallingMessage::EndpointId { id: "P1".into() })
        .await;
    producer.expect("endpointIdConfirm").await;

    let mut viewer = relay.connect_viewer(None).await;
    viewer.expect("config").await;

    viewer.send(&SignallingMessage::ListStreamers).await;
    assert_eq!(
        viewer.expect("streamerList").await,
        SignallingMessage::StreamerList {
            ids: vec!["P1".into()]
        }
    );

    viewer
        .send(&SignallingMessage::Subscribe {
            streamer_id: "P1".into(),
        })
        .await;
    assert_eq!(
        viewer.expect("playerCount").await,
        SignallingMessage::PlayerCount { count: 1 }
    );

    let connected = producer.expect("playerConnected").await;
    let player_id = connected.player_id().unwrap().to_string();
    assert_eq!(player_id, "100");
    assert_eq!(
        connected,
        SignallingMessage::PlayerConnected {
            player_id: player_id.clone(),
            data_channel: true,
            sfu: false,
        }
    );

    producer
        .send(&SignallingMessage::Offer {
            sdp: "v=0 offer".into(),
            player_id: Some(player_id.clone()),
            sfu: None,
        })
        .await;
    assert_eq!(
        viewer.expect("offer").await,
        SignallingMessage::Offer {
            sdp: "v=0 offer".into(),
            player_id: None,
            sfu: None,
        }
    );

    viewer
        .send(&SignallingMessage::Answer {
            sdp: "v=0 answer".into(),
            player_id: None,
        })
        .await;
    assert_eq!(
        producer.expect("answer").await,
        SignallingMessage::Answer {
            sdp: "v=0 answer".into(),
            player_id: Some(player_id.clone()),
        }
    );

    producer.close().await;
    viewer.expect("streamerDisconnected").await;
    assert_eq!(relay.directory().subscription_of(&Peer::Viewer(player_id)), None);
}

#[tokio::test]
async fn test_sfu_topology() {
    let relay = TestRelay::start().await;

    let mut producer = relay.connect_producer().await;
    producer.expect("identify").await;
    producer
        .send(&SignallingMessage::EndpointId { id: "P1".into() })
        .await;
    producer.expect("endpointIdConfirm").await;

    let mut sfu = relay.connect_sfu().await;
    sfu.expect("config").await;
    sfu.send(&SignallingMessage::Subscribe {
        streamer_id: "P1".into(),
    })
    .await;
    assert_eq!(
        producer.expect("playerConnected").await,
        SignallingMessage::PlayerConnected {
            player_id: "1".into(),
            data_channel: true,
            sfu: true,
        }
    );

    // Producer offers to the SFU, the SFU answers back
    producer
        .send(&SignallingMessage::Offer {
            sdp: "v=0 producer".into(),
            player_id: Some("1".into()),
            sfu: None,
        })
        .await;
    sfu.expect("offer").await;
    sfu.send(&SignallingMessage::Answer {
        sdp: "v=0 sfu".into(),
        player_id: None,
    })
    .await;
    assert_eq!(
        producer.expect("answer").await,
        SignallingMessage::Answer {
            sdp: "v=0 sfu".into(),
            player_id: Some("1".into()),
        }
    );

    // Viewer traffic goes to the SFU, tagged with the viewer id
    let mut viewer = relay.connect_viewer(None).await;
    viewer.expect("config").await;
    viewer
        .send(&SignallingMessage::Subscribe {
            streamer_id: "P1".into(),
        })
        .await;
    viewer.expect("playerCount").await;
    let announced = sfu.expect("playerConnected").await;
    let viewer_id = announced.player_id().unwrap().to_string();
    assert_eq!(
        announced,
        SignallingMessage::PlayerConnected {
            player_id: viewer_id.clone(),
            data_channel: true,
            sfu: false,
        }
    );

    // The SFU offers to the viewer
    sfu.send(&SignallingMessage::Offer {
        sdp: "v=0 sfu offer".into(),
        player_id: Some(viewer_id.clone()),
        sfu: Some(true),
    })
    .await;
    assert_eq!(
        viewer.expect("offer").await,
        SignallingMessage::Offer {
            sdp: "v=0 sfu offer".into(),
            player_id: None,
            sfu: Some(true),
        }
    );

    viewer
        .send(&SignallingMessage::DataChannelRequest { player_id: None })
        .await;
    assert_eq!(
        sfu.expect("dataChannelRequest").await,
        SignallingMessage::DataChannelRequest {
            player_id: Some(viewer_id.clone())
        }
    );

    sfu.send(&SignallingMessage::PeerDataChannels {
        player_id: Some(viewer_id.clone()),
        send_stream_id: 3,
        recv_stream_id: 4,
    })
    .await;
    assert_eq!(
        viewer.expect("peerDataChannels").await,
        SignallingMessage::PeerDataChannels {
            player_id: None,
            send_stream_id: 3,
            recv_stream_id: 4,
        }
    );
    assert!(relay.directory().has_data_channel(&viewer_id));

    // A second SFU is turned away, the first keeps working
    let mut second = relay.connect_sfu().await;
    assert_eq!(second.closed().await, Some(1013));
    assert!(relay.directory().relay_unit_connected());
}

#[tokio::test]
async fn test_skip_sfu_goes_direct() {
    let relay = TestRelay::start().await;

    let mut producer = relay.connect_producer().await;
    producer.expect("identify").await;
    let mut sfu = relay.connect_sfu().await;
    sfu.expect("config").await;

    let mut viewer = relay.connect_viewer(Some("skipSFU=true")).await;
    viewer.expect("config").await;
    viewer
        .send(&SignallingMessage::Subscribe {
            streamer_id: "anything".into(),
        })
        .await;
    viewer.expect("playerCount").await;
    producer.expect("playerConnected").await;

    viewer
        .send(&SignallingMessage::IceCandidate {
            candidate: json!({"candidate": "candidate:1 1 udp 1 10.0.0.2 6000 typ host"}),
            player_id: None,
        })
        .await;
    let forwarded = producer.expect("iceCandidate").await;
    assert_eq!(forwarded.player_id(), Some("100"));
}

#[tokio::test]
async fn test_malformed_json_closes_1008() {
    let relay = TestRelay::start().await;
    let mut viewer = relay.connect_viewer(None).await;
    viewer.expect("config").await;

    viewer.send_raw("{\"type\": ").await;
    assert_eq!(viewer.closed().await, Some(1008));

    let directory = relay.directory().clone();
    assert!(
        wait_for(
            || {
                let directory = directory.clone();
                async move { directory.viewer_count() == 0 }
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    );
}

#[tokio::test]
async fn test_player_limit_closes_1013() {
    let relay = TestRelay::start_with_config(RelayConfig {
        max_players: 1,
        ..Default::default()
    })
    .await;

    let mut first = relay.connect_viewer(None).await;
    first.expect("config").await;

    let mut second = relay.connect_viewer(None).await;
    assert_eq!(second.closed().await, Some(1013));
    assert_eq!(relay.directory().viewer_count(), 1);
}

#[tokio::test]
async fn test_producer_kicks_viewer() {
    let relay = TestRelay::start().await;

    let mut producer = relay.connect_producer().await;
    producer.expect("identify").await;
    let mut viewer = relay.connect_viewer(None).await;
    viewer.expect("config").await;
    viewer
        .send(&SignallingMessage::Subscribe {
            streamer_id: "x".into(),
        })
        .await;
    let player_id = producer.expect("playerConnected").await.player_id().unwrap().to_string();

    producer
        .send(&SignallingMessage::DisconnectPlayer {
            player_id,
            reason: Some("idle".into()),
        })
        .await;
    assert_eq!(viewer.closed().await, Some(1011));
    producer.expect("playerDisconnected").await;
}
