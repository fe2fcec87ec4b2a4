//! Message descriptors and direction-scoped protocol tables

use std::collections::HashMap;
use std::fmt;

use crate::wire::FieldType;
use crate::{Error, Result};

/// Which way a message travels over the data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Viewer → producer (input, commands, requests)
    ToStreamer,
    /// Producer → viewer (responses, frames, files)
    FromStreamer,
}

impl Direction {
    /// Value used by the `Direction` key of a protocol update
    pub fn code(self) -> u8 {
        match self {
            Direction::ToStreamer => 0,
            Direction::FromStreamer => 1,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Direction::ToStreamer),
            1 => Some(Direction::FromStreamer),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToStreamer => f.write_str("to-streamer"),
            Direction::FromStreamer => f.write_str("from-streamer"),
        }
    }
}

/// How the bytes after the id are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Typed fields per `structure`
    Fields,
    /// UTF-16LE text (usually JSON)
    Text,
    /// `u32` LE total length followed by a chunk, reassembled across deliveries
    Chunked,
    /// Opaque bytes handed to the handler untouched
    Raw,
}

/// Numeric id plus field layout for one message kind in one direction
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    pub id: u8,
    /// Fixed encoded size after the id byte, 0 for variable-length messages
    pub byte_length: usize,
    pub structure: Vec<FieldType>,
    pub kind: PayloadKind,
}

impl MessageDescriptor {
    /// Descriptor with typed fields; byte length derived from the structure
    pub fn new(id: u8, structure: Vec<FieldType>) -> Self {
        let byte_length = structure
            .iter()
            .map(|f| f.width())
            .sum::<Option<usize>>()
            .unwrap_or(0);
        let kind = if crate::wire::is_free_form(&structure) {
            PayloadKind::Text
        } else {
            PayloadKind::Fields
        };
        Self {
            id,
            byte_length,
            structure,
            kind,
        }
    }

    /// Descriptor without fields
    pub fn empty(id: u8) -> Self {
        Self::new(id, Vec::new())
    }

    /// Descriptor of the given payload kind (no typed fields)
    pub fn with_kind(id: u8, kind: PayloadKind) -> Self {
        let structure = match kind {
            PayloadKind::Text => vec![FieldType::String],
            _ => Vec::new(),
        };
        Self {
            id,
            byte_length: 0,
            structure,
            kind,
        }
    }
}

/// Bijective name ↔ id table for one direction
#[derive(Debug, Clone)]
pub struct ProtocolTable {
    direction: Direction,
    by_name: HashMap<String, MessageDescriptor>,
    by_id: HashMap<u8, String>,
}

impl ProtocolTable {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            by_name: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Insert or replace a descriptor.
    ///
    /// Fails if the id already belongs to a different name; the table is
    /// left unchanged in that case.
    pub fn insert(&mut self, name: &str, descriptor: MessageDescriptor) -> Result<()> {
        if let Some(existing) = self.by_id.get(&descriptor.id) {
            if existing != name {
                return Err(Error::DuplicateId {
                    id: descriptor.id,
                    existing: existing.clone(),
                });
            }
        }

        if let Some(previous) = self.by_name.get(name) {
            self.by_id.remove(&previous.id);
        }

        self.by_id.insert(descriptor.id, name.to_string());
        self.by_name.insert(name.to_string(), descriptor);
        Ok(())
    }

    /// Remove a message by name
    pub fn remove(&mut self, name: &str) -> Option<MessageDescriptor> {
        let descriptor = self.by_name.remove(name)?;
        self.by_id.remove(&descriptor.id);
        Some(descriptor)
    }

    /// Look up a descriptor by name
    pub fn get(&self, name: &str) -> Option<&MessageDescriptor> {
        self.by_name.get(name)
    }

    /// Reverse lookup: id → name
    pub fn name_of(&self, id: u8) -> Option<&str> {
        self.by_id.get(&id).map(|s| s.as_str())
    }

    /// Look up name and descriptor by id
    pub fn by_id(&self, id: u8) -> Option<(&str, &MessageDescriptor)> {
        let name = self.by_id.get(&id)?;
        let descriptor = self.by_name.get(name)?;
        Some((name.as_str(), descriptor))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All names, sorted by id
    pub fn names(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.by_id.iter().collect();
        ids.sort_by_key(|(id, _)| **id);
        ids.into_iter().map(|(_, name)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
