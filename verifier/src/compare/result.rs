use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of comparing one matched message pair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompareResult {
    pub msg_type: String,
    /// Tags present on the expected side only.
    pub missing_tags: Vec<u32>,
    /// Tags present on the actual side only.
    pub extra_tags: Vec<u32>,
    /// Tag to (expected, actual) for normalized values that differ.
    pub differing_values: BTreeMap<u32, (String, String)>,
}

impl CompareResult {
    pub fn passed(&self) -> bool {
        self.missing_tags.is_empty()
            && self.extra_tags.is_empty()
            && self.differing_values.is_empty()
    }
}

/// Per-pair compare results accumulated over a run, keyed by match id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffReport {
    pub entries: Vec<(String, CompareResult)>,
}

impl DiffReport {
    pub fn push(&mut self, id: String, result: CompareResult) {
        self.entries.push((id, result));
    }

    pub fn total_messages(&self) -> usize {
        self.entries.len()
    }

    pub fn failed_messages(&self) -> usize {
        self.entries.iter().filter(|(_, r)| !r.passed()).count()
    }

    pub fn extend(&mut self, other: DiffReport) {
        self.entries.extend(other.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_requires_all_empty() {
        let mut result = CompareResult {
            msg_type: "D".to_string(),
            ..CompareResult::default()
        };
        assert!(result.passed());
        result.extra_tags.push(55);
        assert!(!result.passed());
    }

    #[test]
    fn test_report_counts() {
        let mut report = DiffReport::default();
        report.push("1-1".to_string(), CompareResult::default());
        let mut failed = CompareResult::default();
        failed.missing_tags.push(11);
        report.push("2-2".to_string(), failed);
        assert_eq!(report.total_messages(), 2);
        assert_eq!(report.failed_messages(), 1);
    }
}
