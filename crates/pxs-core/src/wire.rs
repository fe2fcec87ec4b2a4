//! Data channel wire codec
//!
//! Every data channel message is laid out as:
//! ```text
//! ┌────────┬──────────────────────────────────────────────┐
//! │ Byte 0 │ numeric message id (direction scoped)         │
//! ├────────┼──────────────────────────────────────────────┤
//! │ 1..    │ fields, little-endian, in descriptor order    │
//! └────────┴──────────────────────────────────────────────┘
//! ```
//!
//! A structure consisting of a single `string` field carries free-form
//! JSON as UTF-16LE code units running to the end of the buffer. A
//! `string` field mixed with other fields is prefixed with its code-unit
//! count as a `uint16`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::descriptor::MessageDescriptor;
use crate::{Error, Result};

/// Primitive field kinds a descriptor can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "uint8")]
    Uint8,
    #[serde(rename = "uint16")]
    Uint16,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "float")]
    Float32,
    #[serde(rename = "double")]
    Float64,
    #[serde(rename = "string")]
    String,
}

impl FieldType {
    /// Encoded width in bytes, `None` for variable-length fields
    pub fn width(self) -> Option<usize> {
        match self {
            FieldType::Uint8 => Some(1),
            FieldType::Uint16 | FieldType::Int16 => Some(2),
            FieldType::Float32 => Some(4),
            FieldType::Float64 => Some(8),
            FieldType::String => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Uint8 => "uint8",
            FieldType::Uint16 => "uint16",
            FieldType::Int16 => "int16",
            FieldType::Float32 => "float",
            FieldType::Float64 => "double",
            FieldType::String => "string",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    I16(i16),
    F32(f32),
    F64(f64),
    Text(String),
}

impl FieldValue {
    fn matches(&self, field: FieldType) -> bool {
        matches!(
            (self, field),
            (FieldValue::U8(_), FieldType::Uint8)
                | (FieldValue::U16(_), FieldType::Uint16)
                | (FieldValue::I16(_), FieldType::Int16)
                | (FieldValue::F32(_), FieldType::Float32)
                | (FieldValue::F64(_), FieldType::Float64)
                | (FieldValue::Text(_), FieldType::String)
        )
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        FieldValue::U8(v)
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        FieldValue::U16(v)
    }
}

impl From<i16> for FieldValue {
    fn from(v: i16) -> Self {
        FieldValue::I16(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::F32(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encode a complete message: id byte followed by its fields
pub fn encode_message(
    name: &str,
    descriptor: &MessageDescriptor,
    values: &[FieldValue],
) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(1 + estimate_size(descriptor, values));
    buf.put_u8(descriptor.id);
    encode_fields(&mut buf, name, &descriptor.structure, values)?;
    Ok(buf.freeze())
}

#[inline]
fn estimate_size(descriptor: &MessageDescriptor, values: &[FieldValue]) -> usize {
    if descriptor.byte_length > 0 {
        return descriptor.byte_length;
    }
    values
        .iter()
        .map(|v| match v {
            FieldValue::Text(s) => 2 + s.len() * 2,
            _ => 8,
        })
        .sum()
}

/// Encode field values against a structure
pub fn encode_fields(
    buf: &mut BytesMut,
    name: &str,
    structure: &[FieldType],
    values: &[FieldValue],
) -> Result<()> {
    if structure.len() != values.len() {
        return Err(Error::FieldCountMismatch {
            name: name.to_string(),
            expected: structure.len(),
            actual: values.len(),
        });
    }

    let free_form = is_free_form(structure);

    for (index, (field, value)) in structure.iter().zip(values).enumerate() {
        if !value.matches(*field) {
            return Err(Error::FieldTypeMismatch {
                name: name.to_string(),
                index,
                expected: field.as_str(),
            });
        }

        match value {
            FieldValue::U8(v) => buf.put_u8(*v),
            FieldValue::U16(v) => buf.put_u16_le(*v),
            FieldValue::I16(v) => buf.put_i16_le(*v),
            FieldValue::F32(v) => buf.put_f32_le(*v),
            FieldValue::F64(v) => buf.put_f64_le(*v),
            FieldValue::Text(s) => {
                if free_form {
                    encode_utf16(buf, s);
                } else {
                    let units = s.encode_utf16().count();
                    if units > u16::MAX as usize {
                        return Err(Error::InvalidText(format!(
                            "{}: string field of {} code units",
                            name, units
                        )));
                    }
                    buf.put_u16_le(units as u16);
                    encode_utf16(buf, s);
                }
            }
        }
    }

    Ok(())
}

/// Write a string as UTF-16LE code units
pub fn encode_utf16(buf: &mut BytesMut, s: &str) {
    for unit in s.encode_utf16() {
        buf.put_u16_le(unit);
    }
}

/// Structure made of exactly one string: the JSON-carrying message kinds
#[inline]
pub fn is_free_form(structure: &[FieldType]) -> bool {
    structure.len() == 1 && structure[0] == FieldType::String
}

// ============================================================================
// DECODING
// ============================================================================

/// Decode the fields of a payload (id byte already stripped)
pub fn decode_fields(name: &str, structure: &[FieldType], payload: &[u8]) -> Result<Vec<FieldValue>> {
    if is_free_form(structure) {
        return Ok(vec![FieldValue::Text(decode_utf16(payload)?)]);
    }

    let mut buf = payload;
    let mut values = Vec::with_capacity(structure.len());

    for field in structure {
        let value = match field {
            FieldType::Uint8 => {
                ensure(buf, 1)?;
                FieldValue::U8(buf.get_u8())
            }
            FieldType::Uint16 => {
                ensure(buf, 2)?;
                FieldValue::U16(buf.get_u16_le())
            }
            FieldType::Int16 => {
                ensure(buf, 2)?;
                FieldValue::I16(buf.get_i16_le())
            }
            FieldType::Float32 => {
                ensure(buf, 4)?;
                FieldValue::F32(buf.get_f32_le())
            }
            FieldType::Float64 => {
                ensure(buf, 8)?;
                FieldValue::F64(buf.get_f64_le())
            }
            FieldType::String => {
                ensure(buf, 2)?;
                let units = buf.get_u16_le() as usize;
                ensure(buf, units * 2)?;
                let text = decode_utf16(&buf[..units * 2])?;
                buf.advance(units * 2);
                FieldValue::Text(text)
            }
        };
        values.push(value);
    }

    if buf.has_remaining() {
        tracing::debug!("{}: {} trailing bytes ignored", name, buf.remaining());
    }

    Ok(values)
}

/// Decode UTF-16LE code units into a string
pub fn decode_utf16(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::InvalidText(format!("odd byte count {}", bytes.len())));
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    String::from_utf16(&units).map_err(|e| Error::InvalidText(e.to_string()))
}

#[inline]
fn ensure(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(Error::BufferTooSmall {
            needed,
            have: buf.len(),
        });
    }
    Ok(())
}
