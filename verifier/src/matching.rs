//! Pair-and-compare of expected vs. actual exit streams under a
//! precomputed correlation strategy. Every expected entry is consumed at
//! most once.

use crate::compare::{compare, CompareConfig, DiffReport};
use crate::link::{ConsumeOutcome, CorrelationStrategy, LinkIndex, LinkerConfig};
use fixlab_common::LogEntry;
use tracing::debug;

/// Counts and diffs from matching one pair of streams.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matched: usize,
    pub unmatched_expected: usize,
    pub unmatched_actual: usize,
    pub ambiguous: usize,
    pub report: DiffReport,
}

/// Match every actual entry against the expected index, comparing each
/// consumed pair. Ids take the form `{prefix}{expectedLine}-{actualLine}`.
pub fn match_streams(
    expected: &[LogEntry],
    actual: &[LogEntry],
    strategy: CorrelationStrategy,
    linker: &LinkerConfig,
    compare_config: &CompareConfig,
    id_prefix: &str,
) -> MatchOutcome {
    let mut index = LinkIndex::build(expected, strategy, linker.normalizers.clone());
    let mut outcome = MatchOutcome::default();

    for entry in actual {
        match index.consume(entry) {
            ConsumeOutcome::Unmatched => outcome.unmatched_actual += 1,
            ConsumeOutcome::Ambiguous => outcome.ambiguous += 1,
            ConsumeOutcome::Consumed(expected_entry) => {
                let result = compare(&expected_entry.message, &entry.message, compare_config);
                let id = format!("{id_prefix}{}-{}", expected_entry.line, entry.line);
                if !result.passed() {
                    debug!(id = %id, "Compare failure");
                }
                outcome.report.push(id, result);
                outcome.matched += 1;
            }
        }
    }

    outcome.unmatched_expected = expected.len().saturating_sub(outcome.matched);
    outcome
}
