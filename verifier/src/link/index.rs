use super::discovery::CorrelationStrategy;
use super::key::LinkKey;
use crate::normalize::Normalizer;
use fixlab_common::LogEntry;
use std::collections::{BTreeMap, HashMap};

/// Result of resolving one out-side entry against the index.
#[derive(Debug)]
pub enum Resolution {
    /// No strategy for the msgType, no key, or an empty/absent bucket.
    Unmatched,
    /// More than one in-side entry shares the key.
    Ambiguous(usize),
    /// Exactly one candidate.
    One { key: LinkKey, in_line: u32 },
}

/// In-side entries bucketed by correlation key under a fixed strategy.
pub struct LinkIndex {
    buckets: HashMap<LinkKey, Vec<LogEntry>>,
    strategy: CorrelationStrategy,
    normalizers: BTreeMap<u32, Normalizer>,
}

impl LinkIndex {
    pub fn build(
        entries: &[LogEntry],
        strategy: CorrelationStrategy,
        normalizers: BTreeMap<u32, Normalizer>,
    ) -> Self {
        let mut buckets: HashMap<LinkKey, Vec<LogEntry>> = HashMap::new();
        for entry in entries {
            let Some(msg_type) = entry.msg_type() else {
                continue;
            };
            let Some(combo) = strategy.tags_for(msg_type) else {
                continue;
            };
            if let Some(key) = LinkKey::of(&entry.message, combo, &normalizers) {
                buckets.entry(key).or_default().push(entry.clone());
            }
        }
        Self {
            buckets,
            strategy,
            normalizers,
        }
    }

    /// Key of an out-side entry under the index's strategy.
    pub fn key_of(&self, entry: &LogEntry) -> Option<LinkKey> {
        let msg_type = entry.msg_type()?;
        let combo = self.strategy.tags_for(msg_type)?;
        if combo.is_empty() {
            return None;
        }
        LinkKey::of(&entry.message, combo, &self.normalizers)
    }

    /// Non-consuming lookup, used when pairing for a LinkReport.
    pub fn resolve(&self, entry: &LogEntry) -> Resolution {
        let Some(key) = self.key_of(entry) else {
            return Resolution::Unmatched;
        };
        match self.buckets.get(&key).map(Vec::as_slice) {
            None | Some([]) => Resolution::Unmatched,
            Some([single]) => Resolution::One {
                in_line: single.line,
                key,
            },
            Some(bucket) => Resolution::Ambiguous(bucket.len()),
        }
    }

    /// Consuming lookup, used by message matching: a singleton bucket is
    /// removed so no later entry can pair with it again.
    pub fn consume(&mut self, entry: &LogEntry) -> ConsumeOutcome {
        let Some(key) = self.key_of(entry) else {
            return ConsumeOutcome::Unmatched;
        };
        match self.buckets.get_mut(&key) {
            None => ConsumeOutcome::Unmatched,
            Some(bucket) => match bucket.len() {
                0 => ConsumeOutcome::Unmatched,
                1 => ConsumeOutcome::Consumed(bucket.remove(0)),
                _ => ConsumeOutcome::Ambiguous,
            },
        }
    }

    /// Buckets holding two or more in-side entries, each summarized with
    /// up to its first five line numbers.
    pub fn collisions(&self) -> Vec<(LinkKey, usize, Vec<u32>)> {
        self.buckets
            .iter()
            .filter(|(_, bucket)| bucket.len() >= 2)
            .map(|(key, bucket)| {
                let lines: Vec<u32> = bucket.iter().take(5).map(|e| e.line).collect();
                (key.clone(), bucket.len(), lines)
            })
            .collect()
    }

    pub fn strategy(&self) -> &CorrelationStrategy {
        &self.strategy
    }
}

#[derive(Debug)]
pub enum ConsumeOutcome {
    Unmatched,
    Ambiguous,
    Consumed(LogEntry),
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixlab_common::FixMessage;

    fn entry(line: u32, payload: &[u8]) -> LogEntry {
        LogEntry::new(line, FixMessage::parse(payload))
    }

    fn strategy_11() -> CorrelationStrategy {
        let mut strategy = CorrelationStrategy::default();
        strategy.insert("D", vec![11]);
        strategy
    }

    #[test]
    fn test_consume_removes_entry() {
        let expected = vec![entry(1, b"35=D\x0111=A\x01")];
        let mut index = LinkIndex::build(&expected, strategy_11(), BTreeMap::new());
        let probe = entry(1, b"35=D\x0111=A\x01");
        assert!(matches!(index.consume(&probe), ConsumeOutcome::Consumed(e) if e.line == 1));
        assert!(matches!(index.consume(&probe), ConsumeOutcome::Unmatched));
    }

    #[test]
    fn test_ambiguous_not_consumed() {
        let expected = vec![
            entry(1, b"35=D\x0111=A\x01"),
            entry(2, b"35=D\x0111=A\x01"),
        ];
        let mut index = LinkIndex::build(&expected, strategy_11(), BTreeMap::new());
        let probe = entry(1, b"35=D\x0111=A\x01");
        assert!(matches!(index.consume(&probe), ConsumeOutcome::Ambiguous));
        assert!(matches!(index.consume(&probe), ConsumeOutcome::Ambiguous));
    }

    #[test]
    fn test_no_strategy_is_unmatched() {
        let expected = vec![entry(1, b"35=8\x0111=A\x01")];
        let mut index = LinkIndex::build(&expected, strategy_11(), BTreeMap::new());
        let probe = entry(1, b"35=8\x0111=A\x01");
        assert!(matches!(index.consume(&probe), ConsumeOutcome::Unmatched));
    }

    #[test]
    fn test_collisions_capped_at_five_lines() {
        let expected: Vec<LogEntry> = (1..=7)
            .map(|i| entry(i, b"35=D\x0111=A\x01"))
            .collect();
        let index = LinkIndex::build(&expected, strategy_11(), BTreeMap::new());
        let collisions = index.collisions();
        assert_eq!(collisions.len(), 1);
        let (_, count, lines) = &collisions[0];
        assert_eq!(*count, 7);
        assert_eq!(lines, &vec![1, 2, 3, 4, 5]);
    }
}
