//! Offline verification: for every session found on disk, discover a
//! correlation strategy between input and expected, then (when an actual
//! folder is configured) match expected against actual and aggregate.

use crate::compare::{CompareConfig, DiffReport};
use crate::error::VerifyResult;
use crate::filter::MsgTypeFilter;
use crate::link::{discover, link_streams, LinkReport, LinkerConfig};
use crate::loader;
use crate::matching::match_streams;
use fixlab_common::scan::{ScanConfig, Scanner};
use fixlab_common::SessionKey;
use std::path::PathBuf;
use tracing::info;

/// Configuration for one offline run.
#[derive(Debug, Clone)]
pub struct OfflineConfig {
    pub input_dir: PathBuf,
    pub expected_dir: PathBuf,
    /// When absent, the run stops at link discovery per session.
    pub actual_dir: Option<PathBuf>,
    pub filter: MsgTypeFilter,
    pub scan: ScanConfig,
    pub linker: LinkerConfig,
    pub compare: CompareConfig,
}

impl OfflineConfig {
    pub fn new(input_dir: impl Into<PathBuf>, expected_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            expected_dir: expected_dir.into(),
            actual_dir: None,
            filter: MsgTypeFilter::allow_all(),
            scan: ScanConfig::default(),
            linker: LinkerConfig::default(),
            compare: CompareConfig::default(),
        }
    }
}

/// Aggregated outcome across all sessions of an offline run.
#[derive(Debug, Default)]
pub struct OfflineRunResult {
    pub used_actual: bool,
    pub matched: usize,
    pub unmatched_expected: usize,
    pub unmatched_actual: usize,
    pub ambiguous: usize,
    pub report: DiffReport,
    /// Per-session link reports in session id order.
    pub link_reports: Vec<(SessionKey, LinkReport)>,
}

impl OfflineRunResult {
    pub fn passed(&self) -> bool {
        self.unmatched_expected == 0
            && self.unmatched_actual == 0
            && self.ambiguous == 0
            && self.report.failed_messages() == 0
    }
}

/// Run the offline pipeline over every session present in any of the
/// configured directories, in ascending session id order.
pub fn run_offline(config: &OfflineConfig) -> VerifyResult<OfflineRunResult> {
    config.linker.validate()?;
    let scanner = Scanner::new(config.scan.clone());

    let mut dirs = vec![config.input_dir.as_path(), config.expected_dir.as_path()];
    if let Some(actual) = &config.actual_dir {
        dirs.push(actual.as_path());
    }
    let sessions = loader::discover_sessions(dirs)?;

    let mut result = OfflineRunResult {
        used_actual: config.actual_dir.is_some(),
        ..OfflineRunResult::default()
    };

    for session in sessions {
        let input = loader::load_session(&config.input_dir, &session, &scanner, &config.filter)?;
        let expected =
            loader::load_session(&config.expected_dir, &session, &scanner, &config.filter)?;

        let strategy = discover(&input, &expected, &config.linker);
        let link_report = link_streams(&input, &expected, strategy.clone(), &config.linker);
        info!(
            session = %session,
            linked = link_report.matched_count(),
            unmatched = link_report.unmatched,
            ambiguous = link_report.ambiguous,
            "Linked session streams"
        );

        match &config.actual_dir {
            None => {
                result.unmatched_expected += link_report.unmatched;
                result.ambiguous += link_report.ambiguous;
            }
            Some(actual_dir) => {
                let actual =
                    loader::load_session(actual_dir, &session, &scanner, &config.filter)?;
                let outcome = match_streams(
                    &expected,
                    &actual,
                    strategy,
                    &config.linker,
                    &config.compare,
                    &format!("{}:", session.id()),
                );
                result.matched += outcome.matched;
                result.unmatched_expected += outcome.unmatched_expected;
                result.unmatched_actual += outcome.unmatched_actual;
                result.ambiguous += outcome.ambiguous;
                result.report.extend(outcome.report);
            }
        }
        result.link_reports.push((session, link_report));
    }

    Ok(result)
}
