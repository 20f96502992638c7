use fixlab_common::FixMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Allow-list over MsgType (tag 35) values. An empty set allows every
/// message through; messages without a msgType are always rejected by a
/// non-empty filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTypeFilter {
    allowed: BTreeSet<String>,
}

impl MsgTypeFilter {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts_type(&self, msg_type: Option<&str>) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        msg_type.is_some_and(|t| self.allowed.contains(t))
    }

    pub fn accepts(&self, message: &FixMessage) -> bool {
        self.accepts_type(message.msg_type())
    }

    pub fn is_allow_all(&self) -> bool {
        self.allowed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allows_everything() {
        let filter = MsgTypeFilter::allow_all();
        assert!(filter.accepts(&FixMessage::parse(b"35=D\x01")));
        assert!(filter.accepts(&FixMessage::parse(b"11=A\x01")));
    }

    #[test]
    fn test_allow_list() {
        let filter = MsgTypeFilter::new(["D", "8"]);
        assert!(filter.accepts(&FixMessage::parse(b"35=D\x01")));
        assert!(!filter.accepts(&FixMessage::parse(b"35=A\x01")));
        assert!(!filter.accepts(&FixMessage::parse(b"11=A\x01")));
    }
}
