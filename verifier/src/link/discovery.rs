use super::config::LinkerConfig;
use super::key::LinkKey;
use fixlab_common::LogEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Sub-scores are scaled by this factor and summed in integer arithmetic
/// so discovery stays deterministic on small populations.
const SCORE_SCALE: i64 = 10_000;

/// The chosen correlation tag combination per message type. Serializes
/// stably (sorted by msgType) so prepared strategies can be cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationStrategy {
    by_msg_type: BTreeMap<String, Vec<u32>>,
}

impl CorrelationStrategy {
    pub fn insert(&mut self, msg_type: impl Into<String>, combo: Vec<u32>) {
        self.by_msg_type.insert(msg_type.into(), combo);
    }

    pub fn tags_for(&self, msg_type: &str) -> Option<&[u32]> {
        self.by_msg_type.get(msg_type).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.by_msg_type.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u32])> {
        self.by_msg_type
            .iter()
            .map(|(t, c)| (t.as_str(), c.as_slice()))
    }
}

/// Score of one candidate combination for one message type.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ComboScore {
    score: i64,
    combo: Vec<u32>,
}

impl ComboScore {
    /// Strict preference order: higher score, then fewer tags, then
    /// lexicographically smaller tag list.
    fn beats(&self, other: &ComboScore) -> bool {
        if self.score != other.score {
            return self.score > other.score;
        }
        if self.combo.len() != other.combo.len() {
            return self.combo.len() < other.combo.len();
        }
        self.combo < other.combo
    }
}

/// Choose the best correlation combination for every message type that
/// appears on the out-side.
pub fn discover(
    in_entries: &[LogEntry],
    out_entries: &[LogEntry],
    config: &LinkerConfig,
) -> CorrelationStrategy {
    let out_types: BTreeSet<&str> = out_entries.iter().filter_map(LogEntry::msg_type).collect();

    let mut strategy = CorrelationStrategy::default();
    for msg_type in out_types {
        let in_side: Vec<&LogEntry> = in_entries
            .iter()
            .filter(|e| e.msg_type() == Some(msg_type))
            .collect();
        let out_side: Vec<&LogEntry> = out_entries
            .iter()
            .filter(|e| e.msg_type() == Some(msg_type))
            .collect();

        let mut best: Option<ComboScore> = None;
        for combo in config.combinations_for(msg_type) {
            let Some(score) = score_combination(&in_side, &out_side, &combo, config) else {
                continue;
            };
            let candidate = ComboScore { score, combo };
            if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                best = Some(candidate);
            }
        }

        if let Some(best) = best {
            debug!(
                msg_type,
                combo = ?best.combo,
                score = best.score,
                "Selected correlation combination"
            );
            strategy.insert(msg_type, best.combo);
        } else {
            debug!(msg_type, "No scorable correlation combination");
        }
    }
    strategy
}

/// Integer score of one combination, or None when either side has no
/// message carrying every tag of the combination.
fn score_combination(
    in_side: &[&LogEntry],
    out_side: &[&LogEntry],
    combo: &[u32],
    config: &LinkerConfig,
) -> Option<i64> {
    if in_side.is_empty() || out_side.is_empty() {
        return None;
    }

    let in_counts = key_counts(in_side, combo, config);
    let out_counts = key_counts(out_side, combo, config);

    let valid_in: i64 = in_counts.values().sum();
    let valid_out: i64 = out_counts.values().sum();
    if valid_in == 0 || valid_out == 0 {
        return None;
    }

    let matched_out: i64 = out_counts
        .iter()
        .filter(|(key, _)| in_counts.contains_key(*key))
        .map(|(_, &count)| count)
        .sum();

    let uniqueness_in = SCORE_SCALE * in_counts.len() as i64 / valid_in;
    let uniqueness_out = SCORE_SCALE * out_counts.len() as i64 / valid_out;
    let match_rate = SCORE_SCALE * matched_out / valid_out;
    let coverage = (SCORE_SCALE * valid_in / in_side.len() as i64
        + SCORE_SCALE * valid_out / out_side.len() as i64)
        / 2;

    Some(uniqueness_in + uniqueness_out + match_rate + coverage)
}

fn key_counts(
    entries: &[&LogEntry],
    combo: &[u32],
    config: &LinkerConfig,
) -> HashMap<LinkKey, i64> {
    let mut counts = HashMap::new();
    for entry in entries {
        if let Some(key) = LinkKey::of(&entry.message, combo, &config.normalizers) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixlab_common::FixMessage;

    fn entries(payloads: &[&[u8]]) -> Vec<LogEntry> {
        payloads
            .iter()
            .enumerate()
            .map(|(i, p)| LogEntry::new(i as u32 + 1, FixMessage::parse(p)))
            .collect()
    }

    #[test]
    fn test_unique_tag_wins() {
        // Tag 11 is unique on both sides; tag 55 collides.
        let input = entries(&[
            b"35=D\x0111=A\x0155=MSFT\x01",
            b"35=D\x0111=B\x0155=MSFT\x01",
        ]);
        let expected = entries(&[
            b"35=D\x0111=A\x0155=MSFT\x01",
            b"35=D\x0111=B\x0155=MSFT\x01",
        ]);
        let config = LinkerConfig {
            candidate_tags: vec![11, 55],
            candidate_combinations: vec![],
            ..LinkerConfig::default()
        };
        let strategy = discover(&input, &expected, &config);
        assert_eq!(strategy.tags_for("D"), Some(&[11u32][..]));
    }

    #[test]
    fn test_only_out_side_types_considered() {
        let input = entries(&[b"35=D\x0111=A\x01", b"35=G\x0111=B\x01"]);
        let expected = entries(&[b"35=D\x0111=A\x01"]);
        let strategy = discover(&input, &expected, &LinkerConfig::default());
        assert!(strategy.tags_for("G").is_none());
        assert!(strategy.tags_for("D").is_some());
    }

    #[test]
    fn test_type_without_scorable_combo_is_omitted() {
        // The expected side's only message lacks every candidate tag.
        let input = entries(&[b"35=D\x0111=A\x01"]);
        let expected = entries(&[b"35=D\x0158=note\x01"]);
        let strategy = discover(&input, &expected, &LinkerConfig::default());
        assert!(strategy.is_empty());
    }

    #[test]
    fn test_tie_break_prefers_fewer_then_smaller_tags() {
        // Tags 11 and 37 are both perfectly unique and matching, as is
        // the pair {11,37}; the singleton [11] must win.
        let side = &[
            b"35=D\x0111=A\x0137=X\x01" as &[u8],
            b"35=D\x0111=B\x0137=Y\x01",
        ];
        let input = entries(side);
        let expected = entries(side);
        let config = LinkerConfig {
            candidate_tags: vec![37, 11],
            candidate_combinations: vec![vec![11, 37]],
            ..LinkerConfig::default()
        };
        let strategy = discover(&input, &expected, &config);
        assert_eq!(strategy.tags_for("D"), Some(&[11u32][..]));
    }

    #[test]
    fn test_determinism_under_input_reordering() {
        let a = entries(&[
            b"35=D\x0111=A\x0141=R\x01",
            b"35=D\x0111=B\x0141=R\x01",
            b"35=D\x0111=C\x0141=S\x01",
        ]);
        let mut reordered: Vec<LogEntry> = a.iter().rev().cloned().collect();
        for (i, entry) in reordered.iter_mut().enumerate() {
            entry.line = i as u32 + 1;
        }
        let out = entries(&[b"35=D\x0111=A\x0141=R\x01", b"35=D\x0111=C\x0141=S\x01"]);
        let config = LinkerConfig::default();
        assert_eq!(discover(&a, &out, &config), discover(&reordered, &out, &config));
    }

    #[test]
    fn test_match_rate_drives_selection() {
        // Tag 37 is unique on both sides but never matches across them;
        // tag 11 matches everywhere.
        let input = entries(&[
            b"35=D\x0111=A\x0137=I1\x01",
            b"35=D\x0111=B\x0137=I2\x01",
        ]);
        let expected = entries(&[
            b"35=D\x0111=A\x0137=O1\x01",
            b"35=D\x0111=B\x0137=O2\x01",
        ]);
        let config = LinkerConfig {
            candidate_tags: vec![11, 37],
            candidate_combinations: vec![],
            ..LinkerConfig::default()
        };
        let strategy = discover(&input, &expected, &config);
        assert_eq!(strategy.tags_for("D"), Some(&[11u32][..]));
    }
}
