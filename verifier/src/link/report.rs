use super::config::LinkerConfig;
use super::discovery::CorrelationStrategy;
use super::index::{LinkIndex, Resolution};
use fixlab_common::LogEntry;
use serde::Serialize;
use std::cmp::Reverse;

/// One correlated pair of line numbers across the two streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixLink {
    pub correlation_id: String,
    pub in_line: u32,
    pub out_line: u32,
}

/// A correlation-key bucket holding two or more in-side messages.
#[derive(Debug, Clone, Serialize)]
pub struct CollisionExample {
    pub msg_type: String,
    pub key: String,
    pub count: usize,
    /// First in-side line numbers sharing the key, capped at five.
    pub in_lines: Vec<u32>,
}

/// Outcome of linking one session's in/out streams.
#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub strategy: CorrelationStrategy,
    pub matched: Vec<FixLink>,
    pub unmatched: usize,
    pub ambiguous: usize,
    /// Worst collisions, capped at five examples.
    pub collisions: Vec<CollisionExample>,
}

impl LinkReport {
    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }
}

/// Build the index over the in-side and pair every out-side entry.
pub fn link_streams(
    in_entries: &[LogEntry],
    out_entries: &[LogEntry],
    strategy: CorrelationStrategy,
    config: &LinkerConfig,
) -> LinkReport {
    let index = LinkIndex::build(in_entries, strategy, config.normalizers.clone());

    let mut matched = Vec::new();
    let mut unmatched = 0usize;
    let mut ambiguous = 0usize;
    for entry in out_entries {
        match index.resolve(entry) {
            Resolution::One { key, in_line } => matched.push(FixLink {
                correlation_id: key.to_string(),
                in_line,
                out_line: entry.line,
            }),
            Resolution::Ambiguous(_) => ambiguous += 1,
            Resolution::Unmatched => unmatched += 1,
        }
    }

    let mut collisions = index.collisions();
    collisions.sort_by(|(ka, ca, _), (kb, cb, _)| (Reverse(ca), ka).cmp(&(Reverse(cb), kb)));
    let collisions = collisions
        .into_iter()
        .take(5)
        .map(|(key, count, in_lines)| CollisionExample {
            msg_type: key.msg_type.clone(),
            key: key.to_string(),
            count,
            in_lines,
        })
        .collect();

    LinkReport {
        strategy: index.strategy().clone(),
        matched,
        unmatched,
        ambiguous,
        collisions,
    }
}
