//! Message protocol registry tests

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use pxs_core::assembly::chunk_delivery;
use pxs_core::registry::{decode_with, encode_with};
use pxs_core::wire::{self, FieldValue};
use pxs_core::{
    DataChannelSink, Direction, InboundMessage, InboundPayload, MessageProtocolRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Bytes>>,
}

impl RecordingSink {
    fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }
}

impl DataChannelSink for RecordingSink {
    fn send(&self, data: Bytes) -> pxs_core::Result<()> {
        self.sent.lock().push(data);
        Ok(())
    }
}

fn registry() -> (Arc<RecordingSink>, MessageProtocolRegistry) {
    let sink = Arc::new(RecordingSink::default());
    let registry = MessageProtocolRegistry::with_defaults(sink.clone());
    (sink, registry)
}

fn text_message(id: u8, text: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[id]);
    wire::encode_utf16(&mut buf, text);
    buf.to_vec()
}

#[test]
fn test_send_writes_to_sink() {
    let (sink, registry) = registry();
    registry
        .send("MouseDown", &[FieldValue::U8(0), FieldValue::U16(100), FieldValue::U16(200)])
        .expect("send failed");

    assert_eq!(sink.sent(), vec![Bytes::from_static(&[72, 0, 100, 0, 200, 0])]);
}

#[test]
fn test_protocol_swap_is_atomic_for_snapshots() {
    let (_sink, registry) = registry();
    let old = registry.table(Direction::ToStreamer);
    let in_flight = encode_with(
        &old,
        "MouseDown",
        &[FieldValue::U8(1), FieldValue::U16(5), FieldValue::U16(6)],
    )
    .unwrap();

    let report = registry
        .apply_protocol_update(
            r#"{"Direction":0,
                "MouseDown":{"id":120,"byteLength":5,"structure":["uint8","uint16","uint16"]},
                "RequestInitialSettings":{"id":7},
                "RequestQualityControl":{"id":1}}"#,
        )
        .expect("update failed");
    assert_eq!(report.installed.len(), 3);

    // Old snapshot is untouched and still decodes what was encoded with it
    assert_eq!(old.get("MouseDown").unwrap().id, 72);
    let (name, _, payload) = decode_with(&old, &in_flight).unwrap();
    assert_eq!(name, "MouseDown");
    assert_eq!(payload, &[1, 5, 0, 6, 0]);

    // New table holds only the accepted entries
    let new = registry.table(Direction::ToStreamer);
    assert_eq!(new.len(), 3);
    assert!(!new.contains("KeyDown"));
    let bytes = registry
        .encode("MouseDown", &[FieldValue::U8(1), FieldValue::U16(5), FieldValue::U16(6)])
        .unwrap();
    assert_eq!(bytes[0], 120);
}

#[test]
fn test_initial_requests_sent_once() {
    let (sink, registry) = registry();
    let update = r#"{"Direction":0,"RequestInitialSettings":{"id":17},"RequestQualityControl":{"id":11}}"#;

    registry.apply_protocol_update(update).unwrap();
    assert_eq!(
        sink.sent(),
        vec![Bytes::from_static(&[17]), Bytes::from_static(&[11])]
    );

    registry.apply_protocol_update(update).unwrap();
    assert_eq!(sink.sent().len(), 2);
}

#[test]
fn test_initial_request_failure_is_not_fatal() {
    let (sink, registry) = registry();
    // Neither request survives this update; the sends fail and are logged
    let report = registry
        .apply_protocol_update(r#"{"Direction":0,"KeyUp":{"id":61,"structure":["uint8"]}}"#)
        .expect("update failed");

    assert_eq!(report.installed, vec!["KeyUp".to_string()]);
    assert!(sink.sent().is_empty());
}

#[test]
fn test_unhandled_name_reported() {
    let (_sink, registry) = registry();
    let report = registry
        .apply_protocol_update(r#"{"Direction":1,"Response":{"id":1},"CustomThing":{"id":40}}"#)
        .unwrap();

    assert_eq!(report.unhandled, vec!["CustomThing".to_string()]);
    assert!(!registry.table(Direction::FromStreamer).contains("CustomThing"));
}

#[test]
fn test_protocol_message_over_data_channel() {
    let (_sink, registry) = registry();
    let responses = Arc::new(Mutex::new(Vec::new()));
    let responses_clone = responses.clone();
    registry.register_inbound("Response", move |msg: &InboundMessage| {
        responses_clone.lock().push(msg.text().unwrap_or_default().to_string());
    });

    let protocol = text_message(255, r#"{"Direction":1,"Response":{"id":20}}"#);
    registry.receive(&protocol).expect("protocol update failed");

    // Response moved to id 20; Protocol is still decodable
    let table = registry.table(Direction::FromStreamer);
    assert_eq!(table.get("Response").unwrap().id, 20);
    assert_eq!(table.name_of(255), Some("Protocol"));

    registry.receive(&text_message(20, "pong")).unwrap();
    assert!(registry.receive(&text_message(1, "stale")).is_err());
    assert_eq!(responses.lock().clone(), vec!["pong".to_string()]);
}

#[test]
fn test_freeze_frame_reassembled_before_dispatch() {
    let (_sink, registry) = registry();
    let frames = Arc::new(Mutex::new(Vec::new()));
    let frames_clone = frames.clone();
    registry.register_inbound("FreezeFrame", move |msg: &InboundMessage| {
        if let InboundPayload::Bytes(data) = &msg.payload {
            frames_clone.lock().push(data.clone());
        }
    });

    let mut first = vec![3];
    first.extend(chunk_delivery(6, b"JPE"));
    let mut second = vec![3];
    second.extend(chunk_delivery(6, b"G!!"));

    registry.receive(&first).unwrap();
    assert!(frames.lock().is_empty());
    registry.receive(&second).unwrap();
    assert_eq!(frames.lock().clone(), vec![Bytes::from_static(b"JPEG!!")]);

    // Overflow is rejected, not truncated
    let mut overflow = vec![3];
    overflow.extend(chunk_delivery(2, b"abc"));
    assert!(registry.receive(&overflow).is_err());
    assert_eq!(frames.lock().len(), 1);
}

#[test]
fn test_file_transfer_dispatch() {
    let (_sink, registry) = registry();
    let files = Arc::new(Mutex::new(Vec::new()));
    let files_clone = files.clone();
    registry.register_inbound("FileContents", move |msg: &InboundMessage| {
        if let InboundPayload::File(file) = &msg.payload {
            files_clone.lock().push(file.clone());
        }
    });

    registry.receive(&text_message(8, ".csv")).unwrap();
    registry.receive(&text_message(9, "text/csv")).unwrap();
    let mut contents = vec![10];
    contents.extend(chunk_delivery(3, b"a,b"));
    registry.receive(&contents).unwrap();

    let files = files.lock();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension.as_deref(), Some(".csv"));
    assert_eq!(files[0].mime_type.as_deref(), Some("text/csv"));
    assert_eq!(&files[0].data[..], b"a,b");
}

#[test]
fn test_readers_never_see_partial_table() {
    let (_sink, registry) = registry();
    let registry = Arc::new(registry);
    let failures = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            let failures = failures.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let table = registry.table(Direction::ToStreamer);
                    let id = table.get("KeyUp").map(|d| d.id);
                    let ok = matches!(id, Some(61) | Some(161))
                        && table.contains("RequestInitialSettings");
                    if !ok {
                        failures.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for i in 0..100 {
        let id = if i % 2 == 0 { 161 } else { 61 };
        let update = format!(
            r#"{{"Direction":0,"KeyUp":{{"id":{}}},"RequestInitialSettings":{{"id":7}},"RequestQualityControl":{{"id":1}}}}"#,
            id
        );
        registry.apply_protocol_update(&update).unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}
