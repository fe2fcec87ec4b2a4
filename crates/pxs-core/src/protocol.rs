//! Runtime protocol updates
//!
//! A producer may redefine one direction's table by sending a `Protocol`
//! message whose JSON body looks like:
//!
//! ```json
//! { "Direction": 0, "MouseDown": { "id": 72, "byteLength": 5, "structure": ["uint8", "uint16", "uint16"] } }
//! ```
//!
//! Entries are validated one by one; a bad entry is skipped without
//! affecting the others. The accepted entries become a brand new table.

use serde::Deserialize;
use serde_json::Value;

use crate::defaults;
use crate::descriptor::{Direction, MessageDescriptor, PayloadKind, ProtocolTable};
use crate::wire::FieldType;
use crate::{Error, Result};

const DIRECTION_KEY: &str = "Direction";

/// One validated table entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolEntry {
    pub id: u8,
    #[serde(default)]
    pub byte_length: Option<usize>,
    #[serde(default)]
    pub structure: Option<Vec<FieldType>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    id: Option<u8>,
    #[serde(default)]
    byte_length: Option<usize>,
    #[serde(default)]
    structure: Option<Vec<FieldType>>,
}

/// A parsed protocol message
#[derive(Debug, Clone)]
pub struct ProtocolUpdate {
    pub direction: Direction,
    /// Entries keyed by message name; `Err` carries the rejection reason
    pub entries: Vec<(String, std::result::Result<ProtocolEntry, String>)>,
}

/// Outcome of applying an update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolReport {
    pub installed: Vec<String>,
    /// Entries rejected by validation, with reasons
    pub skipped: Vec<(String, String)>,
    /// Valid entries naming a message nobody handles
    pub unhandled: Vec<String>,
}

impl ProtocolUpdate {
    /// Parse the JSON body of a `Protocol` message
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let object = match value {
            Value::Object(map) => map,
            _ => return Err(Error::InvalidProtocol("expected a JSON object".into())),
        };

        let direction = object
            .get(DIRECTION_KEY)
            .and_then(Value::as_u64)
            .and_then(Direction::from_code)
            .ok_or_else(|| Error::InvalidProtocol("missing or invalid Direction".into()))?;

        let entries = object
            .into_iter()
            .filter(|(name, _)| name != DIRECTION_KEY)
            .map(|(name, value)| {
                let entry = parse_entry(value);
                (name, entry)
            })
            .collect();

        Ok(Self { direction, entries })
    }

    /// Build the replacement table.
    ///
    /// `is_handled` decides whether a name has a registered handler; entries
    /// for unhandled names are reported but not installed.
    pub fn build_table<F>(&self, is_handled: F) -> (ProtocolTable, ProtocolReport)
    where
        F: Fn(&str) -> bool,
    {
        let mut table = ProtocolTable::new(self.direction);
        let mut report = ProtocolReport::default();

        for (name, entry) in &self.entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(reason) => {
                    tracing::warn!("Protocol entry {} rejected: {}", name, reason);
                    report.skipped.push((name.clone(), reason.clone()));
                    continue;
                }
            };

            if !is_handled(name) {
                tracing::error!(
                    "No registered {} handler for \"{}\"; register one before sending a protocol that names it",
                    self.direction,
                    name
                );
                report.unhandled.push(name.clone());
                continue;
            }

            let descriptor = self.descriptor_for(name, entry);
            match table.insert(name, descriptor) {
                Ok(()) => report.installed.push(name.clone()),
                Err(e) => {
                    tracing::warn!("Protocol entry {} rejected: {}", name, e);
                    report.skipped.push((name.clone(), e.to_string()));
                }
            }
        }

        (table, report)
    }

    fn descriptor_for(&self, name: &str, entry: &ProtocolEntry) -> MessageDescriptor {
        let structure = entry.structure.clone().unwrap_or_default();

        let mut descriptor = match self.direction {
            Direction::ToStreamer => MessageDescriptor::new(entry.id, structure),
            Direction::FromStreamer if !structure.is_empty() => {
                MessageDescriptor::new(entry.id, structure)
            }
            Direction::FromStreamer => {
                let kind = defaults::from_streamer_kind(name).unwrap_or(PayloadKind::Raw);
                MessageDescriptor::with_kind(entry.id, kind)
            }
        };

        if let Some(len) = entry.byte_length {
            descriptor.byte_length = len;
        }
        descriptor
    }
}

fn parse_entry(value: Value) -> std::result::Result<ProtocolEntry, String> {
    let raw: RawEntry = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let id = raw.id.ok_or_else(|| "missing id".to_string())?;
    Ok(ProtocolEntry {
        id,
        byte_length: raw.byte_length,
        structure: raw.structure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direction() {
        let update = ProtocolUpdate::parse(r#"{"Direction": 1, "Response": {"id": 9}}"#).unwrap();
        assert_eq!(update.direction, Direction::FromStreamer);
        assert_eq!(update.entries.len(), 1);

        assert!(ProtocolUpdate::parse(r#"{"Response": {"id": 9}}"#).is_err());
        assert!(ProtocolUpdate::parse(r#"{"Direction": 7}"#).is_err());
        assert!(ProtocolUpdate::parse("[]").is_err());
    }

    #[test]
    fn test_bad_entries_skipped_individually() {
        let update = ProtocolUpdate::parse(
            r#"{
                "Direction": 0,
                "KeyUp": {"byteLength": 1},
                "KeyDown": {"id": 60, "structure": ["uint8", "uint8"]},
                "KeyPress": {"id": 61, "structure": ["nibble"]},
                "Secret": {"id": 99}
            }"#,
        )
        .unwrap();

        let (table, report) = update.build_table(|name| name != "Secret");

        assert_eq!(report.installed, vec!["KeyDown".to_string()]);
        assert_eq!(report.unhandled, vec!["Secret".to_string()]);
        let skipped: Vec<_> = report.skipped.iter().map(|(n, _)| n.as_str()).collect();
        assert!(skipped.contains(&"KeyUp"));
        assert!(skipped.contains(&"KeyPress"));

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("KeyDown").unwrap().byte_length, 2);
    }

    #[test]
    fn test_from_streamer_kind_inferred() {
        let update =
            ProtocolUpdate::parse(r#"{"Direction": 1, "FreezeFrame": {"id": 30}}"#).unwrap();
        let (table, _) = update.build_table(|_| true);
        assert_eq!(table.get("FreezeFrame").unwrap().kind, PayloadKind::Chunked);
    }
}
