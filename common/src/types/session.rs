// src/types/session.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one FIX session as the ordered pair
/// (SenderCompID, TargetCompID). Both parts are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub sender_comp_id: String,
    pub target_comp_id: String,
}

impl SessionKey {
    pub fn new(sender_comp_id: impl Into<String>, target_comp_id: impl Into<String>) -> Self {
        Self {
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
        }
    }

    /// Stable identifier, also used as the log file stem.
    pub fn id(&self) -> String {
        format!("{}_{}", self.sender_comp_id, self.target_comp_id)
    }

    /// Parse a `SENDER_TARGET` identifier back into a key. The first
    /// underscore splits the two parts.
    pub fn from_id(id: &str) -> Option<Self> {
        let (sender, target) = id.split_once('_')?;
        if sender.is_empty() || target.is_empty() {
            return None;
        }
        Some(Self::new(sender, target))
    }

    /// Extract the session key from a message's 49/56 tags.
    pub fn of_message(message: &super::message::FixMessage) -> Option<Self> {
        let sender = message.sender_comp_id()?;
        let target = message.target_comp_id()?;
        if sender.is_empty() || target.is_empty() {
            return None;
        }
        Some(Self::new(sender, target))
    }

    /// The same session seen from the counter-party's side.
    pub fn reversed(&self) -> Self {
        Self::new(self.target_comp_id.clone(), self.sender_comp_id.clone())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.sender_comp_id, self.target_comp_id)
    }
}
