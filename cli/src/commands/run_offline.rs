use super::{emit, fail, EXIT_COMPARE_FAILED, EXIT_OK};
use crate::output::{write_junit, RunReport};
use clap::Args;
use fixlab_verifier::offline::run_offline;
use fixlab_verifier::scenario::Scenario;
use std::path::PathBuf;
use tracing::info;

/// Compare expected against recorded actual logs for every session of a
/// scenario.
#[derive(Debug, Args)]
pub struct RunOfflineArgs {
    /// Scenario file (YAML or JSON).
    #[arg(long)]
    pub scenario: PathBuf,
    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Also write a JUnit XML report.
    #[arg(long)]
    pub junit: Option<PathBuf>,
}

pub fn run(args: RunOfflineArgs) -> i32 {
    let scenario = match Scenario::load(&args.scenario) {
        Ok(scenario) => scenario,
        Err(error) => return fail("Cannot load scenario", &error),
    };
    let config = match scenario.offline_config() {
        Ok(config) => config,
        Err(error) => return fail("Invalid offline config", &error),
    };
    let result = match run_offline(&config) {
        Ok(result) => result,
        Err(error) => return fail("Offline run failed", &error),
    };

    let report = RunReport::offline(&result);
    let json = match report.to_json() {
        Ok(json) => json,
        Err(error) => return fail("Cannot serialize report", &error),
    };
    if let Err(error) = emit(args.out.as_deref(), &json) {
        return fail("Cannot write report", &error);
    }
    if let Some(junit_path) = &args.junit {
        if let Err(error) = std::fs::write(junit_path, write_junit(&report)) {
            return fail("Cannot write JUnit report", &error);
        }
    }

    info!(passed = report.passed, matched = report.matched, "Offline run finished");
    if report.passed {
        EXIT_OK
    } else {
        EXIT_COMPARE_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    fn write_log(dir: &Path, content: &[u8]) {
        let mut file = std::fs::File::create(dir.join("BUY_SELL.log")).unwrap();
        file.write_all(content).unwrap();
    }

    #[test]
    fn test_offline_command_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        let expected = root.path().join("expected");
        let actual = root.path().join("actual");
        for dir in [&input, &expected, &actual] {
            std::fs::create_dir_all(dir).unwrap();
        }
        write_log(&input, b"8=FIX.4.4|35=D|11=ORD-1|55=MSFT|10=001|");
        write_log(&expected, b"8=FIX.4.4|35=D|11=ORD-1|55=MSFT|10=011|");
        write_log(&actual, b"8=FIX.4.4|35=D|11=ORD-1|55=AAPL|10=021|");

        let scenario_path = root.path().join("scenario.yaml");
        std::fs::write(
            &scenario_path,
            format!(
                "sessions:\n  input_dir: {}\n  expected_dir: {}\n  actual_dir: {}\n",
                input.display(),
                expected.display(),
                actual.display()
            ),
        )
        .unwrap();

        let out = root.path().join("report.json");
        let junit = root.path().join("report.xml");
        let code = run(RunOfflineArgs {
            scenario: scenario_path,
            out: Some(out.clone()),
            junit: Some(junit.clone()),
        });
        assert_eq!(code, EXIT_COMPARE_FAILED);

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(report["matched"], 1);
        assert_eq!(report["failed_messages"], 1);
        assert_eq!(report["results"][0]["differing_values"]["55"][1], "AAPL");

        let xml = std::fs::read_to_string(junit).unwrap();
        assert!(xml.contains("<failure"));
    }

    #[test]
    fn test_missing_scenario_is_config_error() {
        let code = run(RunOfflineArgs {
            scenario: PathBuf::from("/nonexistent/scenario.yaml"),
            out: None,
            junit: None,
        });
        assert_eq!(code, super::super::EXIT_CONFIG_ERROR);
    }
}
