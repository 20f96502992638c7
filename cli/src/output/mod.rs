//! Run report serialization: a JSON summary for machines and JUnit XML
//! for CI test ingestion.

mod junit;

pub use junit::write_junit;

use fixlab_verifier::compare::DiffReport;
use fixlab_verifier::offline::OfflineRunResult;
use fixlab_verifier::online::OnlineRunResult;
use serde::Serialize;
use std::collections::BTreeMap;

/// Flattened outcome of one run, shared by both modes.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub mode: String,
    pub passed: bool,
    pub matched: usize,
    pub unmatched_expected: usize,
    pub unmatched_actual: usize,
    pub ambiguous: usize,
    pub total_messages: usize,
    pub failed_messages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
    pub results: Vec<CaseReport>,
}

/// One matched pair in the report.
#[derive(Debug, Serialize)]
pub struct CaseReport {
    pub id: String,
    pub msg_type: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_tags: Vec<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_tags: Vec<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub differing_values: BTreeMap<u32, (String, String)>,
}

fn cases_of(report: &DiffReport) -> Vec<CaseReport> {
    report
        .entries
        .iter()
        .map(|(id, result)| CaseReport {
            id: id.clone(),
            msg_type: result.msg_type.clone(),
            passed: result.passed(),
            missing_tags: result.missing_tags.clone(),
            extra_tags: result.extra_tags.clone(),
            differing_values: result.differing_values.clone(),
        })
        .collect()
}

impl RunReport {
    pub fn offline(result: &OfflineRunResult) -> Self {
        Self {
            mode: "offline".to_string(),
            passed: result.passed(),
            matched: result.matched,
            unmatched_expected: result.unmatched_expected,
            unmatched_actual: result.unmatched_actual,
            ambiguous: result.ambiguous,
            total_messages: result.report.total_messages(),
            failed_messages: result.report.failed_messages(),
            sent: None,
            received: None,
            dropped: None,
            timed_out: None,
            results: cases_of(&result.report),
        }
    }

    pub fn online(result: &OnlineRunResult) -> Self {
        Self {
            mode: "online".to_string(),
            passed: result.passed(),
            matched: result.matched,
            unmatched_expected: result.unmatched_expected,
            unmatched_actual: result.unmatched_actual,
            ambiguous: result.ambiguous,
            total_messages: result.report.total_messages(),
            failed_messages: result.report.failed_messages(),
            sent: Some(result.sent),
            received: Some(result.received),
            dropped: Some(result.dropped),
            timed_out: Some(result.timed_out),
            results: cases_of(&result.report),
        }
    }

    /// Post-run conditions that are not per-message diffs but must fail
    /// a test suite: unmatched counts, ambiguity, drops, timeout.
    pub fn operational_failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if self.unmatched_expected > 0 {
            failures.push(format!("unmatched_expected={}", self.unmatched_expected));
        }
        if self.unmatched_actual > 0 {
            failures.push(format!("unmatched_actual={}", self.unmatched_actual));
        }
        if self.ambiguous > 0 {
            failures.push(format!("ambiguous={}", self.ambiguous));
        }
        if let Some(dropped) = self.dropped {
            if dropped > 0 {
                failures.push(format!("dropped={dropped}"));
            }
        }
        if self.timed_out == Some(true) {
            failures.push("timed_out".to_string());
        }
        failures
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
