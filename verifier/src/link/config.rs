use crate::error::{VerifyError, VerifyResult};
use crate::normalize::Normalizer;
use fixlab_common::types::tags;
use std::collections::{BTreeMap, BTreeSet};

/// Configuration for correlation discovery.
///
/// Candidate tags contribute singleton combinations; explicit
/// combinations add multi-tag candidates. All combinations are sorted
/// ascending and deduplicated at build time so discovery tie-breaks are
/// stable.
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    pub candidate_tags: Vec<u32>,
    pub candidate_combinations: Vec<Vec<u32>>,
    /// Per-msgType combination overrides.
    pub per_msg_type: BTreeMap<String, Vec<Vec<u32>>>,
    /// Normalizers applied to key parts before correlation.
    pub normalizers: BTreeMap<u32, Normalizer>,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            candidate_tags: vec![
                tags::CL_ORD_ID,
                tags::EXEC_ID,
                tags::ORDER_ID,
                tags::ORIG_CL_ORD_ID,
                tags::QUOTE_REQ_ID,
            ],
            candidate_combinations: vec![
                vec![tags::CL_ORD_ID, tags::ORIG_CL_ORD_ID],
                vec![tags::EXEC_ID, tags::ORDER_ID],
            ],
            per_msg_type: BTreeMap::new(),
            normalizers: BTreeMap::new(),
        }
    }
}

impl LinkerConfig {
    /// Reject non-positive tags and normalize combination shape.
    pub fn validate(&self) -> VerifyResult<()> {
        if self.candidate_tags.iter().any(|&t| t == 0) {
            return Err(VerifyError::Config(
                "Linker candidate tags must be positive".to_string(),
            ));
        }
        for combo in self
            .candidate_combinations
            .iter()
            .chain(self.per_msg_type.values().flatten())
        {
            if combo.is_empty() {
                return Err(VerifyError::Config(
                    "Linker combinations must be non-empty".to_string(),
                ));
            }
            if combo.iter().any(|&t| t == 0) {
                return Err(VerifyError::Config(
                    "Linker combination tags must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Candidate combinations for one message type: the per-type override
    /// when present, otherwise singletons of the candidate tags plus the
    /// explicit combinations. Sorted and deduplicated.
    pub fn combinations_for(&self, msg_type: &str) -> Vec<Vec<u32>> {
        let raw: Vec<Vec<u32>> = match self.per_msg_type.get(msg_type) {
            Some(overrides) => overrides.clone(),
            None => self
                .candidate_tags
                .iter()
                .map(|&t| vec![t])
                .chain(self.candidate_combinations.iter().cloned())
                .collect(),
        };
        let mut unique = BTreeSet::new();
        for mut combo in raw {
            combo.sort_unstable();
            combo.dedup();
            if !combo.is_empty() {
                unique.insert(combo);
            }
        }
        unique.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combinations_sorted_and_deduped() {
        let config = LinkerConfig {
            candidate_tags: vec![37, 11],
            candidate_combinations: vec![vec![41, 11], vec![11, 41], vec![11]],
            ..LinkerConfig::default()
        };
        let combos = config.combinations_for("D");
        assert_eq!(combos, vec![vec![11], vec![11, 41], vec![37]]);
    }

    #[test]
    fn test_per_msg_type_override() {
        let config = LinkerConfig {
            per_msg_type: BTreeMap::from([("8".to_string(), vec![vec![17]])]),
            ..LinkerConfig::default()
        };
        assert_eq!(config.combinations_for("8"), vec![vec![17]]);
        assert!(config.combinations_for("D").len() > 1);
    }

    #[test]
    fn test_validate_rejects_zero_tag() {
        let config = LinkerConfig {
            candidate_tags: vec![0],
            ..LinkerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
