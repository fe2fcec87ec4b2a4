//! Message protocol registry
//!
//! Owns the two direction-scoped tables and the handler maps, and is the
//! single entry point for every data channel send and receive:
//! - the input layer calls [`MessageProtocolRegistry::send`]
//! - the presentation layer registers handlers with
//!   [`MessageProtocolRegistry::register_inbound`]
//! - the session feeds raw data channel messages to
//!   [`MessageProtocolRegistry::receive`]
//!
//! Tables are held behind `RwLock<Arc<ProtocolTable>>`. Every operation
//! works on one `Arc` snapshot taken at its start, and a protocol update
//! builds a complete table before swapping the pointer, so no caller ever
//! observes a partially updated table.

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::assembly::{ChunkAssembler, FileTransfer, ReceivedFile};
use crate::defaults::{self, PROTOCOL_MESSAGE};
use crate::descriptor::{Direction, MessageDescriptor, PayloadKind, ProtocolTable};
use crate::protocol::{ProtocolReport, ProtocolUpdate};
use crate::wire::{self, FieldValue};
use crate::{Error, Result};

/// Writes encoded messages to the data channel
pub trait DataChannelSink: Send + Sync {
    fn send(&self, data: Bytes) -> Result<()>;
}

/// Decoded producer message handed to inbound handlers
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub name: String,
    pub payload: InboundPayload,
}

/// Payload of an inbound message, shaped by its descriptor kind
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    Fields(Vec<FieldValue>),
    Text(String),
    Bytes(Bytes),
    File(ReceivedFile),
}

impl InboundMessage {
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            InboundPayload::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A message that was just written to the data channel
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub name: String,
    pub values: Vec<FieldValue>,
    pub data: Bytes,
}

pub type InboundHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
pub type OutboundHandler = Arc<dyn Fn(&OutboundMessage) + Send + Sync>;

/// A handler for either direction
#[derive(Clone)]
pub enum Handler {
    /// Observer of viewer messages as they are sent
    ToStreamer(OutboundHandler),
    /// Consumer of decoded producer messages
    FromStreamer(InboundHandler),
}

impl Handler {
    pub fn direction(&self) -> Direction {
        match self {
            Handler::ToStreamer(_) => Direction::ToStreamer,
            Handler::FromStreamer(_) => Direction::FromStreamer,
        }
    }
}

/// Bidirectional message registry for one data channel session
pub struct MessageProtocolRegistry {
    to_streamer: RwLock<Arc<ProtocolTable>>,
    from_streamer: RwLock<Arc<ProtocolTable>>,
    outbound_handlers: DashMap<String, OutboundHandler>,
    inbound_handlers: DashMap<String, InboundHandler>,
    sink: Arc<dyn DataChannelSink>,
    assemblers: Mutex<HashMap<String, ChunkAssembler>>,
    files: Mutex<FileTransfer>,
    initial_requests_sent: AtomicBool,
}

impl MessageProtocolRegistry {
    /// Create a registry with empty tables
    pub fn new(sink: Arc<dyn DataChannelSink>) -> Self {
        Self {
            to_streamer: RwLock::new(Arc::new(ProtocolTable::new(Direction::ToStreamer))),
            from_streamer: RwLock::new(Arc::new(ProtocolTable::new(Direction::FromStreamer))),
            outbound_handlers: DashMap::new(),
            inbound_handlers: DashMap::new(),
            sink,
            assemblers: Mutex::new(HashMap::new()),
            files: Mutex::new(FileTransfer::new()),
            initial_requests_sent: AtomicBool::new(false),
        }
    }

    /// Create a registry seeded with the baseline message set
    pub fn with_defaults(sink: Arc<dyn DataChannelSink>) -> Self {
        let registry = Self::new(sink);
        registry.populate_default();
        registry
    }

    /// Seed both tables with the baseline message set.
    ///
    /// Names without a handler get a logging one; handlers registered
    /// earlier are kept.
    pub fn populate_default(&self) {
        *self.to_streamer.write() = Arc::new(defaults::table(Direction::ToStreamer));
        *self.from_streamer.write() = Arc::new(defaults::table(Direction::FromStreamer));

        for (name, _, _) in defaults::TO_STREAMER {
            self.outbound_handlers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(|msg: &OutboundMessage| trace!("-> {}", msg.name)) as OutboundHandler);
        }
        for (name, _, _) in defaults::FROM_STREAMER {
            self.inbound_handlers
                .entry(name.to_string())
                .or_insert_with(|| {
                    Arc::new(|msg: &InboundMessage| debug!("<- {} (unhandled)", msg.name)) as InboundHandler
                });
        }
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Register (or replace) a handler for `name` in `direction`
    pub fn register_handler(&self, direction: Direction, name: &str, handler: Handler) -> Result<()> {
        if handler.direction() != direction {
            return Err(Error::InvalidProtocol(format!(
                "{} handler registered for {} message {}",
                handler.direction(),
                direction,
                name
            )));
        }
        match handler {
            Handler::ToStreamer(h) => {
                self.outbound_handlers.insert(name.to_string(), h);
            }
            Handler::FromStreamer(h) => {
                self.inbound_handlers.insert(name.to_string(), h);
            }
        }
        Ok(())
    }

    /// Register (or replace) the handler for a producer message
    pub fn register_inbound<F>(&self, name: &str, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.inbound_handlers.insert(name.to_string(), Arc::new(handler));
    }

    /// Register (or replace) the observer for a viewer message
    pub fn register_outbound<F>(&self, name: &str, handler: F)
    where
        F: Fn(&OutboundMessage) + Send + Sync + 'static,
    {
        self.outbound_handlers.insert(name.to_string(), Arc::new(handler));
    }

    pub fn has_handler(&self, direction: Direction, name: &str) -> bool {
        match direction {
            Direction::ToStreamer => self.outbound_handlers.contains_key(name),
            Direction::FromStreamer => self.inbound_handlers.contains_key(name),
        }
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Current table for a direction
    pub fn table(&self, direction: Direction) -> Arc<ProtocolTable> {
        self.table_lock(direction).read().clone()
    }

    fn table_lock(&self, direction: Direction) -> &RwLock<Arc<ProtocolTable>> {
        match direction {
            Direction::ToStreamer => &self.to_streamer,
            Direction::FromStreamer => &self.from_streamer,
        }
    }

    /// Replace one direction's table from a `Protocol` JSON body
    pub fn apply_protocol_update(&self, json: &str) -> Result<ProtocolReport> {
        let update = ProtocolUpdate::parse(json)?;
        let direction = update.direction;

        let (mut table, report) = update.build_table(|name| self.has_handler(direction, name));

        // Keep later protocol messages decodable
        if direction == Direction::FromStreamer && !table.contains(PROTOCOL_MESSAGE) {
            if let Some(descriptor) = self.table(direction).get(PROTOCOL_MESSAGE) {
                if let Err(e) = table.insert(PROTOCOL_MESSAGE, descriptor.clone()) {
                    warn!("Protocol message id taken by another entry: {}", e);
                }
            }
        }

        info!(
            "Applied {} protocol: {} installed, {} skipped, {} unhandled",
            direction,
            report.installed.len(),
            report.skipped.len(),
            report.unhandled.len()
        );

        *self.table_lock(direction).write() = Arc::new(table);

        if !self.initial_requests_sent.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.send("RequestInitialSettings", &[]) {
                warn!("Initial settings request failed: {}", e);
            }
            if let Err(e) = self.send("RequestQualityControl", &[]) {
                warn!("Quality control request failed: {}", e);
            }
        }

        Ok(report)
    }

    // =========================================================================
    // Send
    // =========================================================================

    /// Encode a viewer message with the current table
    pub fn encode(&self, name: &str, values: &[FieldValue]) -> Result<Bytes> {
        let table = self.table(Direction::ToStreamer);
        encode_with(&table, name, values)
    }

    /// Encode and write a viewer message to the data channel
    pub fn send(&self, name: &str, values: &[FieldValue]) -> Result<()> {
        let data = self.encode(name, values)?;
        self.sink.send(data.clone())?;

        if let Some(handler) = self.outbound_handlers.get(name).map(|h| h.clone()) {
            handler(&OutboundMessage {
                name: name.to_string(),
                values: values.to_vec(),
                data,
            });
        }

        Ok(())
    }

    // =========================================================================
    // Receive
    // =========================================================================

    /// Split an inbound message into name and raw payload
    pub fn decode(&self, data: &[u8]) -> Result<(String, Bytes)> {
        let table = self.table(Direction::FromStreamer);
        let (name, _, payload) = decode_with(&table, data)?;
        Ok((name.to_string(), Bytes::copy_from_slice(payload)))
    }

    /// Decode, reassemble and dispatch one data channel message.
    ///
    /// Errors are logged and returned; the session carries on either way.
    pub fn receive(&self, data: &[u8]) -> Result<()> {
        let result = self.receive_inner(data);
        if let Err(ref e) = result {
            warn!("Dropped data channel message: {}", e);
        }
        result
    }

    fn receive_inner(&self, data: &[u8]) -> Result<()> {
        let table = self.table(Direction::FromStreamer);
        let (name, descriptor, payload) = decode_with(&table, data)?;

        if name == PROTOCOL_MESSAGE {
            let json = wire::decode_utf16(payload)?;
            self.apply_protocol_update(&json)?;
            return Ok(());
        }

        let payload = match self.shape_payload(name, descriptor, payload)? {
            Some(payload) => payload,
            None => return Ok(()),
        };

        let message = InboundMessage {
            name: name.to_string(),
            payload,
        };

        match self.inbound_handlers.get(name).map(|h| h.clone()) {
            Some(handler) => handler(&message),
            None => debug!("No handler for {}", name),
        }

        Ok(())
    }

    /// Convert raw payload bytes per descriptor kind; `None` while a chunked
    /// payload is still incomplete
    fn shape_payload(
        &self,
        name: &str,
        descriptor: &MessageDescriptor,
        payload: &[u8],
    ) -> Result<Option<InboundPayload>> {
        let shaped = match descriptor.kind {
            PayloadKind::Fields => {
                InboundPayload::Fields(wire::decode_fields(name, &descriptor.structure, payload)?)
            }
            PayloadKind::Text => {
                let text = wire::decode_utf16(payload)?;
                match name {
                    "FileExtension" => self.files.lock().set_extension(text.clone()),
                    "FileMimeType" => self.files.lock().set_mime_type(text.clone()),
                    _ => {}
                }
                InboundPayload::Text(text)
            }
            PayloadKind::Raw => InboundPayload::Bytes(Bytes::copy_from_slice(payload)),
            PayloadKind::Chunked if name == "FileContents" => {
                match self.files.lock().push_contents(payload)? {
                    Some(file) => InboundPayload::File(file),
                    None => return Ok(None),
                }
            }
            PayloadKind::Chunked => {
                let mut assemblers = self.assemblers.lock();
                let assembler = assemblers
                    .entry(name.to_string())
                    .or_insert_with(|| ChunkAssembler::new(name));
                match assembler.push(payload)? {
                    Some(bytes) => InboundPayload::Bytes(bytes),
                    None => return Ok(None),
                }
            }
        };

        Ok(Some(shaped))
    }
}

impl std::fmt::Debug for MessageProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProtocolRegistry")
            .field("to_streamer", &self.to_streamer.read().len())
            .field("from_streamer", &self.from_streamer.read().len())
            .finish()
    }
}

/// Encode against an explicit table snapshot
pub fn encode_with(table: &ProtocolTable, name: &str, values: &[FieldValue]) -> Result<Bytes> {
    let descriptor = table
        .get(name)
        .ok_or_else(|| Error::UnknownMessageType(name.to_string()))?;
    wire::encode_message(name, descriptor, values)
}

/// Decode against an explicit table snapshot: name, descriptor, payload
pub fn decode_with<'t, 'd>(
    table: &'t ProtocolTable,
    data: &'d [u8],
) -> Result<(&'t str, &'t MessageDescriptor, &'d [u8])> {
    let (&id, payload) = data
        .split_first()
        .ok_or(Error::BufferTooSmall { needed: 1, have: 0 })?;
    let (name, descriptor) = table.by_id(id).ok_or(Error::UnknownMessageId(id))?;
    Ok((name, descriptor, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    impl DataChannelSink for CountingSink {
        fn send(&self, _data: Bytes) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_unknown_type_does_not_send() {
        let sink = Arc::new(CountingSink::default());
        let registry = MessageProtocolRegistry::with_defaults(sink.clone());

        let err = registry.send("Teleport", &[]).unwrap_err();
        assert!(matches!(err, Error::UnknownMessageType(ref n) if n == "Teleport"));
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_outbound_observer_called() {
        let sink = Arc::new(CountingSink::default());
        let registry = MessageProtocolRegistry::with_defaults(sink.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        registry.register_outbound("KeyUp", move |msg| {
            assert_eq!(&msg.data[..], &[61, 13]);
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.send("KeyUp", &[FieldValue::U8(13)]).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_handler_direction_checked() {
        let registry = MessageProtocolRegistry::new(Arc::new(CountingSink::default()));
        let handler = Handler::FromStreamer(Arc::new(|_: &InboundMessage| {}));

        assert!(registry
            .register_handler(Direction::ToStreamer, "Response", handler.clone())
            .is_err());
        registry
            .register_handler(Direction::FromStreamer, "Response", handler)
            .unwrap();
        assert!(registry.has_handler(Direction::FromStreamer, "Response"));
        assert!(!registry.has_handler(Direction::ToStreamer, "Response"));
    }

    #[test]
    fn test_unknown_id_is_dropped() {
        let registry = MessageProtocolRegistry::with_defaults(Arc::new(CountingSink::default()));
        assert!(matches!(registry.receive(&[200, 1, 2]), Err(Error::UnknownMessageId(200))));
        assert!(matches!(registry.receive(&[]), Err(Error::BufferTooSmall { .. })));
    }
}
