use crate::types::raw::FixRawMessage;
use crate::types::session::SessionKey;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Aggregate view of a scanned stream, backing the `scan` CLI command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub message_count: u64,
    /// MsgType (tag 35) value to occurrence count.
    pub msg_type_distribution: BTreeMap<String, u64>,
    /// Distinct (sender, target) pairs seen across the stream.
    pub sessions: BTreeSet<SessionKey>,
}

impl ScanSummary {
    pub fn observe(&mut self, raw: &FixRawMessage) {
        self.message_count += 1;
        let message = raw.to_message();
        if let Some(msg_type) = message.msg_type() {
            *self
                .msg_type_distribution
                .entry(msg_type.to_string())
                .or_insert(0) += 1;
        }
        if let Some(key) = SessionKey::of_message(&message) {
            self.sessions.insert(key);
        }
    }
}
