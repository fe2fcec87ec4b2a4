//! Reassembly of length-prefixed payloads split across deliveries
//!
//! Freeze-frame images and file contents are sent as a series of data
//! channel messages, each laid out as:
//! ```text
//! ┌────────┬──────────────────────────┬──────────────┐
//! │ id     │ total length (u32 LE)    │ chunk bytes  │
//! └────────┴──────────────────────────┴──────────────┘
//! ```
//! Chunks are concatenated in arrival order until the running total equals
//! the declared length.

use bytes::{Bytes, BytesMut};

use crate::{Error, Result};

const LENGTH_PREFIX: usize = 4;

/// Upper bound on up-front allocation for a declared length
const MAX_RESERVE: usize = 1 << 20;

/// Accumulates chunks of one length-prefixed payload
#[derive(Debug)]
pub struct ChunkAssembler {
    name: String,
    expected: Option<usize>,
    buffer: BytesMut,
}

impl ChunkAssembler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected: None,
            buffer: BytesMut::new(),
        }
    }

    /// Feed one delivery (payload after the id byte).
    ///
    /// Returns the complete payload once the declared length is reached.
    pub fn push(&mut self, delivery: &[u8]) -> Result<Option<Bytes>> {
        if delivery.len() < LENGTH_PREFIX {
            self.reset();
            return Err(Error::BufferTooSmall {
                needed: LENGTH_PREFIX,
                have: delivery.len(),
            });
        }

        let total = u32::from_le_bytes([delivery[0], delivery[1], delivery[2], delivery[3]]) as usize;
        self.push_chunk(total, &delivery[LENGTH_PREFIX..])
    }

    /// Feed a chunk with an already-parsed declared total
    pub fn push_chunk(&mut self, total: usize, chunk: &[u8]) -> Result<Option<Bytes>> {
        match self.expected {
            Some(expected) if expected != total => {
                self.reset();
                return Err(Error::Reassembly(format!(
                    "{}: declared length changed from {} to {} mid-transfer",
                    self.name, expected, total
                )));
            }
            Some(_) => {}
            None => {
                self.expected = Some(total);
                self.buffer.reserve(total.min(MAX_RESERVE));
            }
        }

        let received = self.buffer.len() + chunk.len();
        if received > total {
            self.reset();
            return Err(Error::Reassembly(format!(
                "{}: received {} bytes, declared {}",
                self.name, received, total
            )));
        }

        self.buffer.extend_from_slice(chunk);

        if received == total {
            let payload = self.buffer.split().freeze();
            self.expected = None;
            tracing::debug!("{} reassembled ({} bytes)", self.name, payload.len());
            return Ok(Some(payload));
        }

        Ok(None)
    }

    /// Bytes received so far for the current payload
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// Declared length of the payload in progress
    pub fn expected(&self) -> Option<usize> {
        self.expected
    }

    pub fn is_idle(&self) -> bool {
        self.expected.is_none()
    }

    /// Drop any partial payload
    pub fn reset(&mut self) {
        self.expected = None;
        self.buffer.clear();
    }
}

/// A file pushed by the producer
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFile {
    pub extension: Option<String>,
    pub mime_type: Option<String>,
    pub data: Bytes,
}

/// Groups `FileExtension`, `FileMimeType` and `FileContents` messages
#[derive(Debug)]
pub struct FileTransfer {
    extension: Option<String>,
    mime_type: Option<String>,
    contents: ChunkAssembler,
}

impl FileTransfer {
    pub fn new() -> Self {
        Self {
            extension: None,
            mime_type: None,
            contents: ChunkAssembler::new("FileContents"),
        }
    }

    pub fn set_extension(&mut self, extension: impl Into<String>) {
        self.extension = Some(extension.into());
    }

    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) {
        self.mime_type = Some(mime_type.into());
    }

    /// Feed one `FileContents` delivery
    pub fn push_contents(&mut self, delivery: &[u8]) -> Result<Option<ReceivedFile>> {
        let data = match self.contents.push(delivery)? {
            Some(data) => data,
            None => return Ok(None),
        };

        Ok(Some(ReceivedFile {
            extension: self.extension.take(),
            mime_type: self.mime_type.take(),
            data,
        }))
    }

    pub fn in_progress(&self) -> bool {
        !self.contents.is_idle()
    }
}

impl Default for FileTransfer {
    fn default() -> Self {
        Self::new()
    }
}

/// Build one delivery: length prefix followed by a chunk
pub fn chunk_delivery(total: u32, chunk: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LENGTH_PREFIX + chunk.len());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(chunk);
    out
}
