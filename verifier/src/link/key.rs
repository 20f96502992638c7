// src/link/key.rs

use crate::normalize::Normalizer;
use fixlab_common::FixMessage;
use std::collections::BTreeMap;
use std::fmt;

/// Correlation key: message type plus the normalized values of an
/// ascending tag combination. Two messages correlate when their keys are
/// equal. Ordering follows (msgType, tags, values), which is the order
/// collision examples are reported in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub msg_type: String,
    pub tags: Vec<u32>,
    pub values: Vec<String>,
}

impl LinkKey {
    /// Build the key of `message` under `combo`. Returns None when any
    /// tag is absent or its normalized value is empty — such messages
    /// cannot be correlated by this combination.
    pub fn of(
        message: &FixMessage,
        combo: &[u32],
        normalizers: &BTreeMap<u32, Normalizer>,
    ) -> Option<Self> {
        let msg_type = message.msg_type()?.to_string();
        let mut values = Vec::with_capacity(combo.len());
        for &tag in combo {
            let raw = message.get(tag)?;
            let value = match normalizers.get(&tag) {
                Some(normalizer) => normalizer.apply(raw),
                None => raw.to_string(),
            };
            if value.is_empty() {
                return None;
            }
            values.push(value);
        }
        Some(Self {
            msg_type,
            tags: combo.to_vec(),
            values,
        })
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.msg_type)?;
        for (i, (tag, value)) in self.tags.iter().zip(&self.values).enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{tag}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_of_message() {
        let msg = FixMessage::parse(b"35=D\x0111=ORD-1\x0141=X\x01");
        let key = LinkKey::of(&msg, &[11, 41], &BTreeMap::new()).unwrap();
        assert_eq!(key.msg_type, "D");
        assert_eq!(key.values, vec!["ORD-1".to_string(), "X".to_string()]);
        assert_eq!(key.to_string(), "D:11=ORD-1,41=X");
    }

    #[test]
    fn test_missing_tag_yields_none() {
        let msg = FixMessage::parse(b"35=D\x0111=ORD-1\x01");
        assert!(LinkKey::of(&msg, &[11, 41], &BTreeMap::new()).is_none());
    }

    #[test]
    fn test_empty_normalized_value_yields_none() {
        let normalizers = BTreeMap::from([(11u32, Normalizer::default())]);
        let msg = FixMessage::parse(b"35=D\x0111=   \x01");
        assert!(LinkKey::of(&msg, &[11], &normalizers).is_none());
    }

    #[test]
    fn test_ordering_is_type_then_tags_then_values() {
        let a = LinkKey {
            msg_type: "8".to_string(),
            tags: vec![11],
            values: vec!["A".to_string()],
        };
        let b = LinkKey {
            msg_type: "D".to_string(),
            tags: vec![11],
            values: vec!["A".to_string()],
        };
        assert!(a < b);
    }
}
