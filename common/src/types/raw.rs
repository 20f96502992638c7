// src/types/raw.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Direction of a logged message relative to the process that wrote the
/// log, recovered from surrounding log text when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("IN") {
            Some(Self::In)
        } else if token.eq_ignore_ascii_case("OUT") {
            Some(Self::Out)
        } else {
            None
        }
    }
}

/// One raw FIX message extracted from a log file.
///
/// The payload is normalized so every field terminator is SOH (0x01) and
/// always ends with `10=NNN` followed by SOH, whatever framing the source
/// file used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixRawMessage {
    /// File the message was extracted from.
    pub origin: PathBuf,
    /// Byte offset of the `8=FIX` start marker within the file.
    pub offset: u64,
    /// SOH-normalized wire payload.
    pub payload: Vec<u8>,
    /// Timestamp text found in the log context before the message.
    pub timestamp: Option<String>,
    /// IN/OUT token found in the log context before the message.
    pub direction: Option<Direction>,
}

impl FixRawMessage {
    /// Parse the payload into a field map.
    pub fn to_message(&self) -> super::message::FixMessage {
        super::message::FixMessage::parse(&self.payload)
    }
}
