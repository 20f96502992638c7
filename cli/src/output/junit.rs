use super::RunReport;
use std::fmt::Write as _;

/// Render a report as JUnit XML: one testsuite per run, one testcase per
/// matched pair, plus an error case for operational failures.
pub fn write_junit(report: &RunReport) -> String {
    let failures = report.failed_messages;
    let operational = report.operational_failures();
    let errors = usize::from(!operational.is_empty());
    let tests = report.results.len() + errors;

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuites tests=\"{tests}\" failures=\"{failures}\" errors=\"{errors}\">"
    );
    let _ = writeln!(
        xml,
        "  <testsuite name=\"fixlab-{}\" tests=\"{tests}\" failures=\"{failures}\" errors=\"{errors}\">",
        escape(&report.mode)
    );

    for case in &report.results {
        if case.passed {
            let _ = writeln!(xml, "    <testcase name=\"{}\"/>", escape(&case.id));
        } else {
            let _ = writeln!(xml, "    <testcase name=\"{}\">", escape(&case.id));
            let mut detail = String::new();
            for tag in &case.missing_tags {
                let _ = writeln!(detail, "missing tag {tag}");
            }
            for tag in &case.extra_tags {
                let _ = writeln!(detail, "extra tag {tag}");
            }
            for (tag, (expected, actual)) in &case.differing_values {
                let _ = writeln!(detail, "tag {tag}: expected {expected:?}, actual {actual:?}");
            }
            let _ = writeln!(
                xml,
                "      <failure message=\"message comparison failed\">{}</failure>",
                escape(detail.trim_end())
            );
            let _ = writeln!(xml, "    </testcase>");
        }
    }

    if !operational.is_empty() {
        let _ = writeln!(xml, "    <testcase name=\"operational\">");
        let _ = writeln!(
            xml,
            "      <error message=\"{}\"/>",
            escape(&operational.join(", "))
        );
        let _ = writeln!(xml, "    </testcase>");
    }

    xml.push_str("  </testsuite>\n</testsuites>\n");
    xml
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CaseReport;
    use std::collections::BTreeMap;

    fn report(passed: bool) -> RunReport {
        let mut differing = BTreeMap::new();
        if !passed {
            differing.insert(55, ("MSFT".to_string(), "AAPL".to_string()));
        }
        RunReport {
            mode: "offline".to_string(),
            passed,
            matched: 1,
            unmatched_expected: if passed { 0 } else { 1 },
            unmatched_actual: 0,
            ambiguous: 0,
            total_messages: 1,
            failed_messages: usize::from(!passed),
            sent: None,
            received: None,
            dropped: None,
            timed_out: None,
            results: vec![CaseReport {
                id: "S:1-1".to_string(),
                msg_type: "D".to_string(),
                passed,
                missing_tags: Vec::new(),
                extra_tags: Vec::new(),
                differing_values: differing,
            }],
        }
    }

    #[test]
    fn test_passing_suite() {
        let xml = write_junit(&report(true));
        assert!(xml.contains("failures=\"0\""));
        assert!(xml.contains("<testcase name=\"S:1-1\"/>"));
        assert!(!xml.contains("<error"));
    }

    #[test]
    fn test_failing_suite_with_operational_error() {
        let xml = write_junit(&report(false));
        assert!(xml.contains("failures=\"1\""));
        assert!(xml.contains("tag 55: expected &quot;MSFT&quot;"));
        assert!(xml.contains("<error message=\"unmatched_expected=1\"/>"));
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
