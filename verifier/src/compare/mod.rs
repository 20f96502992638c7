//! Semantic diff between matched FIX message pairs.

mod config;
mod result;

pub use config::{default_exclude, CompareConfig};
pub use result::{CompareResult, DiffReport};

use fixlab_common::FixMessage;

/// Compare two messages under the given policy.
///
/// The msgType driving include/exclude resolution comes from the expected
/// side, falling back to the actual side. For each tag in scope: present
/// on one side only goes to missing/extra; present on both is normalized
/// and compared.
pub fn compare(expected: &FixMessage, actual: &FixMessage, config: &CompareConfig) -> CompareResult {
    let msg_type = expected
        .msg_type()
        .or_else(|| actual.msg_type())
        .unwrap_or_default()
        .to_string();

    let mut result = CompareResult {
        msg_type: msg_type.clone(),
        ..CompareResult::default()
    };

    for tag in config.tags_to_compare(&msg_type, expected.tags(), actual.tags()) {
        match (expected.get(tag), actual.get(tag)) {
            (Some(_), None) => result.missing_tags.push(tag),
            (None, Some(_)) => result.extra_tags.push(tag),
            (Some(exp), Some(act)) => {
                let exp = config.normalize(tag, exp);
                let act = config.normalize(tag, act);
                if exp != act {
                    result.differing_values.insert(tag, (exp, act));
                }
            }
            (None, None) => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{Normalizer, NormalizerSpec, ReplaceSpec};
    use std::collections::BTreeMap;

    #[test]
    fn test_identical_messages_pass() {
        let msg = FixMessage::parse(b"35=D\x0111=ORD-1\x0155=MSFT\x0154=1\x01");
        let result = compare(&msg, &msg, &CompareConfig::default());
        assert!(result.passed());
        assert_eq!(result.msg_type, "D");
    }

    #[test]
    fn test_differing_value_reported() {
        let expected = FixMessage::parse(b"35=D\x0111=ORD-1\x0155=MSFT\x01");
        let actual = FixMessage::parse(b"35=D\x0111=ORD-1\x0155=AAPL\x01");
        let result = compare(&expected, &actual, &CompareConfig::default());
        assert!(!result.passed());
        assert_eq!(
            result.differing_values.get(&55),
            Some(&("MSFT".to_string(), "AAPL".to_string()))
        );
    }

    #[test]
    fn test_missing_and_extra_tags() {
        let expected = FixMessage::parse(b"35=D\x0111=A\x0138=100\x01");
        let actual = FixMessage::parse(b"35=D\x0111=A\x0144=1.5\x01");
        let result = compare(&expected, &actual, &CompareConfig::default());
        assert_eq!(result.missing_tags, vec![38]);
        assert_eq!(result.extra_tags, vec![44]);
    }

    #[test]
    fn test_normalizer_bridges_formats() {
        let expected = FixMessage::parse(b"35=8\x0137=RA-12345 \x01");
        let actual = FixMessage::parse(b"35=8\x0137=12345\x01");
        let spec = NormalizerSpec {
            trim: true,
            replace: vec![ReplaceSpec {
                pattern: "^RA-".to_string(),
                with: String::new(),
            }],
        };
        let config = CompareConfig {
            normalizers: BTreeMap::from([(37u32, Normalizer::compile(&spec).unwrap())]),
            ..CompareConfig::default()
        };
        assert!(compare(&expected, &actual, &config).passed());
    }

    #[test]
    fn test_time_like_tags_excluded() {
        let expected = FixMessage::parse(b"35=D\x0160=20260228-10:00:00.000\x01");
        let actual = FixMessage::parse(b"35=D\x0160=20260228-10:05:00.000\x01");
        let config = CompareConfig {
            exclude_time_like_tags: true,
            ..CompareConfig::default()
        };
        assert!(compare(&expected, &actual, &config).passed());
        assert!(!compare(&expected, &actual, &CompareConfig::default()).passed());
    }

    #[test]
    fn test_msg_type_falls_back_to_actual() {
        let expected = FixMessage::parse(b"11=A\x01");
        let actual = FixMessage::parse(b"35=D\x0111=A\x01");
        let result = compare(&expected, &actual, &CompareConfig::default());
        assert_eq!(result.msg_type, "D");
        // Tag 35 itself is in scope and differs by absence.
        assert_eq!(result.extra_tags, vec![35]);
    }
}
