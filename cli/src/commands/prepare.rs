use super::{fail, EXIT_OK};
use clap::Args;
use fixlab_common::scan::Scanner;
use fixlab_verifier::link::{discover, CorrelationStrategy};
use fixlab_verifier::loader;
use fixlab_verifier::scenario::Scenario;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Discover correlation strategies between input and expected logs and
/// cache them for later runs.
#[derive(Debug, Args)]
pub struct PrepareArgs {
    /// Directory of entry-side session logs.
    #[arg(long = "in")]
    pub input: PathBuf,
    /// Directory of expected exit-side session logs.
    #[arg(long)]
    pub expected: PathBuf,
    /// Optional scenario supplying filter and linker policy.
    #[arg(long)]
    pub scenario: Option<PathBuf>,
    /// File to write the per-session strategies to (JSON).
    #[arg(long)]
    pub cache: PathBuf,
}

pub fn run(args: PrepareArgs) -> i32 {
    let scenario = match &args.scenario {
        Some(path) => match Scenario::load(path) {
            Ok(scenario) => scenario,
            Err(error) => return fail("Cannot load scenario", &error),
        },
        None => Scenario::default(),
    };
    let filter = scenario.filter();
    let linker = match scenario.linker_config() {
        Ok(linker) => linker,
        Err(error) => return fail("Invalid linker config", &error),
    };
    let scanner = Scanner::new(scenario.scan_config());

    let sessions = match loader::discover_sessions([args.input.as_path(), args.expected.as_path()])
    {
        Ok(sessions) => sessions,
        Err(error) => return fail("Cannot discover sessions", &error),
    };

    let mut strategies: BTreeMap<String, CorrelationStrategy> = BTreeMap::new();
    for session in sessions {
        let loaded = loader::load_session(&args.input, &session, &scanner, &filter)
            .and_then(|input| {
                loader::load_session(&args.expected, &session, &scanner, &filter)
                    .map(|expected| (input, expected))
            });
        let (input, expected) = match loaded {
            Ok(streams) => streams,
            Err(error) => return fail("Cannot load session logs", &error),
        };
        let strategy = discover(&input, &expected, &linker);
        info!(session = %session, empty = strategy.is_empty(), "Discovered strategy");
        strategies.insert(session.id(), strategy);
    }

    let json = match serde_json::to_string_pretty(&strategies) {
        Ok(json) => json,
        Err(error) => return fail("Cannot serialize strategies", &error),
    };
    if let Err(error) = std::fs::write(&args.cache, json) {
        return fail("Cannot write strategy cache", &error);
    }
    EXIT_OK
}
