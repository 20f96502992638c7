use crate::normalize::Normalizer;
use fixlab_common::types::tags;
use std::collections::{BTreeMap, BTreeSet};

/// Tags excluded from comparison unless a scenario overrides them:
/// framing (8, 9, 10), sequence number (34), sending times (52, 122).
pub fn default_exclude() -> BTreeSet<u32> {
    BTreeSet::from([
        tags::BEGIN_STRING,
        tags::BODY_LENGTH,
        tags::CHECKSUM,
        tags::MSG_SEQ_NUM,
        tags::SENDING_TIME,
        tags::ORIG_SENDING_TIME,
    ])
}

/// Policy for the semantic diff between two matched messages.
#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// When set, only these tags are compared (exclusions still apply).
    pub default_include: Option<BTreeSet<u32>>,
    pub default_exclude: BTreeSet<u32>,
    /// Per-msgType include lists; override `default_include`.
    pub per_msg_type_include: BTreeMap<String, BTreeSet<u32>>,
    /// Per-msgType exclude lists; extend `default_exclude`.
    pub per_msg_type_exclude: BTreeMap<String, BTreeSet<u32>>,
    /// Additionally exclude TransactTime (tag 60).
    pub exclude_time_like_tags: bool,
    /// Per-tag value normalizers applied to both sides before comparing.
    pub normalizers: BTreeMap<u32, Normalizer>,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            default_include: None,
            default_exclude: default_exclude(),
            per_msg_type_include: BTreeMap::new(),
            per_msg_type_exclude: BTreeMap::new(),
            exclude_time_like_tags: false,
            normalizers: BTreeMap::new(),
        }
    }
}

impl CompareConfig {
    /// Resolve the set of tags to compare for one message pair.
    pub fn tags_to_compare(
        &self,
        msg_type: &str,
        expected_tags: impl IntoIterator<Item = u32>,
        actual_tags: impl IntoIterator<Item = u32>,
    ) -> BTreeSet<u32> {
        let combined: BTreeSet<u32> = expected_tags.into_iter().chain(actual_tags).collect();

        let include = self
            .per_msg_type_include
            .get(msg_type)
            .or(self.default_include.as_ref());

        let mut exclude = self.default_exclude.clone();
        if self.exclude_time_like_tags {
            exclude.insert(tags::TRANSACT_TIME);
        }
        if let Some(extra) = self.per_msg_type_exclude.get(msg_type) {
            exclude.extend(extra.iter().copied());
        }

        let selected: BTreeSet<u32> = match include {
            Some(include) if !include.is_empty() => {
                combined.intersection(include).copied().collect()
            }
            _ => combined,
        };
        selected.difference(&exclude).copied().collect()
    }

    pub fn normalize(&self, tag: u32, value: &str) -> String {
        match self.normalizers.get(&tag) {
            Some(normalizer) => normalizer.apply(value),
            None => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_exclude_applies() {
        let config = CompareConfig::default();
        let tags = config.tags_to_compare("D", [8, 9, 11, 55], [10, 34, 55]);
        assert_eq!(tags, BTreeSet::from([11, 55]));
    }

    #[test]
    fn test_include_intersects_before_exclude() {
        let config = CompareConfig {
            default_include: Some(BTreeSet::from([11, 52, 55])),
            ..CompareConfig::default()
        };
        // 52 survives the intersect but is then excluded.
        let tags = config.tags_to_compare("D", [11, 52, 54, 55], []);
        assert_eq!(tags, BTreeSet::from([11, 55]));
    }

    #[test]
    fn test_per_msg_type_include_overrides_default() {
        let config = CompareConfig {
            default_include: Some(BTreeSet::from([11])),
            per_msg_type_include: BTreeMap::from([("8".to_string(), BTreeSet::from([37]))]),
            ..CompareConfig::default()
        };
        assert_eq!(config.tags_to_compare("8", [11, 37], []), BTreeSet::from([37]));
        assert_eq!(config.tags_to_compare("D", [11, 37], []), BTreeSet::from([11]));
    }

    #[test]
    fn test_time_like_exclusion() {
        let config = CompareConfig {
            exclude_time_like_tags: true,
            ..CompareConfig::default()
        };
        let tags = config.tags_to_compare("D", [60, 11], [60]);
        assert_eq!(tags, BTreeSet::from([11]));
    }
}
