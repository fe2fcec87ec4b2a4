//! Baseline message set seeded at session start

use crate::descriptor::{Direction, MessageDescriptor, PayloadKind, ProtocolTable};
use crate::wire::FieldType::{self, *};

/// Viewer → producer messages: (name, id, structure)
pub const TO_STREAMER: &[(&str, u8, &[FieldType])] = &[
    // Control
    ("IFrameRequest", 0, &[]),
    ("RequestQualityControl", 1, &[]),
    ("FpsRequest", 2, &[]),
    ("AverageBitrateRequest", 3, &[]),
    ("StartStreaming", 4, &[]),
    ("StopStreaming", 5, &[]),
    ("LatencyTest", 6, &[String]),
    ("RequestInitialSettings", 7, &[]),
    ("TestEcho", 8, &[]),
    ("DataChannelLatencyTest", 9, &[]),
    // Generic
    ("UIInteraction", 50, &[String]),
    ("Command", 51, &[String]),
    ("TextboxEntry", 52, &[String]),
    // Keyboard: key code, repeat
    ("KeyDown", 60, &[Uint8, Uint8]),
    ("KeyUp", 61, &[Uint8]),
    ("KeyPress", 62, &[Uint16]),
    // Mouse
    ("MouseEnter", 70, &[]),
    ("MouseLeave", 71, &[]),
    ("MouseDown", 72, &[Uint8, Uint16, Uint16]),
    ("MouseUp", 73, &[Uint8, Uint16, Uint16]),
    ("MouseMove", 74, &[Uint16, Uint16, Int16, Int16]),
    ("MouseWheel", 75, &[Int16, Uint16, Uint16]),
    ("MouseDouble", 76, &[Uint8, Uint16, Uint16]),
    // Touch: touch count, x, y, finger id, force, valid
    ("TouchStart", 80, &[Uint8, Uint16, Uint16, Uint8, Uint8, Uint8]),
    ("TouchEnd", 81, &[Uint8, Uint16, Uint16, Uint8, Uint8, Uint8]),
    ("TouchMove", 82, &[Uint8, Uint16, Uint16, Uint8, Uint8, Uint8]),
    // Gamepad: controller, button/axis, value
    ("GamepadButtonPressed", 90, &[Uint8, Uint8, Uint8]),
    ("GamepadButtonReleased", 91, &[Uint8, Uint8, Uint8]),
    ("GamepadAnalog", 92, &[Uint8, Uint8, Float64]),
    ("GamepadConnected", 93, &[]),
    ("GamepadDisconnected", 94, &[Uint8]),
];

/// Producer → viewer messages: (name, id, payload kind)
pub const FROM_STREAMER: &[(&str, u8, PayloadKind)] = &[
    ("QualityControlOwnership", 0, PayloadKind::Raw),
    ("Response", 1, PayloadKind::Text),
    ("Command", 2, PayloadKind::Text),
    ("FreezeFrame", 3, PayloadKind::Chunked),
    ("UnfreezeFrame", 4, PayloadKind::Raw),
    ("VideoEncoderAvgQP", 5, PayloadKind::Text),
    ("LatencyTest", 6, PayloadKind::Text),
    ("InitialSettings", 7, PayloadKind::Text),
    ("FileExtension", 8, PayloadKind::Text),
    ("FileMimeType", 9, PayloadKind::Text),
    ("FileContents", 10, PayloadKind::Chunked),
    ("TestEcho", 11, PayloadKind::Text),
    ("InputControlOwnership", 12, PayloadKind::Raw),
    ("GamepadResponse", 13, PayloadKind::Text),
    ("Protocol", 255, PayloadKind::Text),
];

/// Name of the producer message that redefines a table
pub const PROTOCOL_MESSAGE: &str = "Protocol";

/// Default table for a direction
pub fn table(direction: Direction) -> ProtocolTable {
    let mut table = ProtocolTable::new(direction);
    match direction {
        Direction::ToStreamer => {
            for (name, id, structure) in TO_STREAMER {
                let inserted = table.insert(name, MessageDescriptor::new(*id, structure.to_vec()));
                debug_assert!(inserted.is_ok(), "default {} collides: {:?}", name, inserted);
            }
        }
        Direction::FromStreamer => {
            for (name, id, kind) in FROM_STREAMER {
                let inserted = table.insert(name, MessageDescriptor::with_kind(*id, *kind));
                debug_assert!(inserted.is_ok(), "default {} collides: {:?}", name, inserted);
            }
        }
    }
    table
}

/// Default payload kind for a producer message name, used when a protocol
/// update only carries an id
pub fn from_streamer_kind(name: &str) -> Option<PayloadKind> {
    FROM_STREAMER
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, _, kind)| *kind)
}
