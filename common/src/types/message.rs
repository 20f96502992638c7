use super::tags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parsed FIX message: a mapping from tag number to field value.
///
/// Values are 8-bit-clean strings decoded as ISO-Latin-1, so any byte the
/// wire can carry survives a parse/encode round trip. Insertion order is
/// not meaningful — two messages with the same tag/value pairs are equal
/// regardless of the order their fields appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FixMessage {
    fields: BTreeMap<u32, String>,
}

impl FixMessage {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Build a message from tag/value pairs. Later duplicates win.
    pub fn from_pairs<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, V)>,
        V: Into<String>,
    {
        let mut msg = Self::new();
        for (tag, value) in pairs {
            msg.set(tag, value);
        }
        msg
    }

    /// Parse an SOH-delimited payload into a message. Fields without an
    /// `=` or with a non-numeric tag are skipped; the scanner already
    /// guarantees delimiter normalization.
    pub fn parse(payload: &[u8]) -> Self {
        let mut msg = Self::new();
        for field in payload.split(|&b| b == 0x01) {
            if field.is_empty() {
                continue;
            }
            let Some(eq) = field.iter().position(|&b| b == b'=') else {
                continue;
            };
            let tag_text: String = field[..eq].iter().map(|&b| b as char).collect();
            let Ok(tag) = tag_text.parse::<u32>() else {
                continue;
            };
            if tag == 0 {
                continue;
            }
            let value: String = field[eq + 1..].iter().map(|&b| b as char).collect();
            msg.set(tag, value);
        }
        msg
    }

    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields.get(&tag).map(String::as_str)
    }

    pub fn set(&mut self, tag: u32, value: impl Into<String>) {
        self.fields.insert(tag, value.into());
    }

    pub fn remove(&mut self, tag: u32) -> Option<String> {
        self.fields.remove(&tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.fields.contains_key(&tag)
    }

    /// The MsgType (tag 35) value, if present and non-blank.
    pub fn msg_type(&self) -> Option<&str> {
        self.get(tags::MSG_TYPE).filter(|v| !v.is_empty())
    }

    pub fn sender_comp_id(&self) -> Option<&str> {
        self.get(tags::SENDER_COMP_ID)
    }

    pub fn target_comp_id(&self) -> Option<&str> {
        self.get(tags::TARGET_COMP_ID)
    }

    /// Tags in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.fields.iter().map(|(&tag, value)| (tag, value.as_str()))
    }

    pub fn tags(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consume the message into its underlying field map.
    pub fn into_fields(self) -> BTreeMap<u32, String> {
        self.fields
    }

    pub fn fields(&self) -> &BTreeMap<u32, String> {
        &self.fields
    }
}

impl From<BTreeMap<u32, String>> for FixMessage {
    fn from(fields: BTreeMap<u32, String>) -> Self {
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_soh_payload() {
        let msg = FixMessage::parse(b"8=FIX.4.4\x0135=D\x0149=BUY\x0156=SELL\x0111=ORD-1\x0110=001\x01");
        assert_eq!(msg.msg_type(), Some("D"));
        assert_eq!(msg.get(11), Some("ORD-1"));
        assert_eq!(msg.sender_comp_id(), Some("BUY"));
        assert_eq!(msg.target_comp_id(), Some("SELL"));
    }

    #[test]
    fn test_parse_skips_malformed_fields() {
        let msg = FixMessage::parse(b"35=D\x01garbage\x01abc=1\x0111=X\x01");
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.get(11), Some("X"));
    }

    #[test]
    fn test_equality_ignores_wire_order() {
        let a = FixMessage::parse(b"35=D\x0111=A\x0155=MSFT\x01");
        let b = FixMessage::parse(b"55=MSFT\x0135=D\x0111=A\x01");
        assert_eq!(a, b);
    }

    #[test]
    fn test_blank_msg_type_is_none() {
        let msg = FixMessage::parse(b"35=\x0111=A\x01");
        assert_eq!(msg.msg_type(), None);
    }

    #[test]
    fn test_eight_bit_clean_values() {
        let msg = FixMessage::parse(b"35=D\x0158=\xc4\xd6\x01");
        let value = msg.get(58).unwrap();
        assert_eq!(value.chars().map(|c| c as u32).collect::<Vec<_>>(), vec![0xc4, 0xd6]);
    }
}
