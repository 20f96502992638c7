use super::{emit, fail, EXIT_COMPARE_FAILED, EXIT_OK};
use crate::output::{write_junit, RunReport};
use crate::sim_transport::SimulatorTransport;
use clap::Args;
use fixlab_common::scan::Scanner;
use fixlab_simulator::memory::MemoryEngineFactory;
use fixlab_simulator::{Simulator, SimulatorConfig};
use fixlab_verifier::loader;
use fixlab_verifier::online::{run_online, CancelToken, TransportRegistry};
use fixlab_verifier::scenario::Scenario;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Inject entry messages into a live gateway (or the embedded
/// simulator) and verify the exit messages it emits.
#[derive(Debug, Args)]
pub struct RunOnlineArgs {
    /// Scenario file (YAML or JSON).
    #[arg(long)]
    pub scenario: PathBuf,
    /// Transport factory name; overrides the scenario.
    #[arg(long = "transport-class")]
    pub transport_class: Option<String>,
    /// Extra transport properties as K=V, repeatable.
    #[arg(long = "transport-prop", value_parser = parse_property)]
    pub transport_prop: Vec<(String, String)>,
    /// YAML/JSON file of additional transport properties.
    #[arg(long = "transport-config")]
    pub transport_config: Option<PathBuf>,
    #[arg(long = "receive-timeout-ms")]
    pub receive_timeout_ms: Option<u64>,
    #[arg(long = "queue-capacity")]
    pub queue_capacity: Option<usize>,
    /// Start the embedded simulator and register the `sim` transport.
    #[arg(long = "start-simulator")]
    pub start_simulator: bool,
    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Also write a JUnit XML report.
    #[arg(long)]
    pub junit: Option<PathBuf>,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("Expected K=V, got {raw:?}"))
}

pub async fn run(args: RunOnlineArgs) -> i32 {
    let scenario = match Scenario::load(&args.scenario) {
        Ok(scenario) => scenario,
        Err(error) => return fail("Cannot load scenario", &error),
    };
    let (mut transport_name, mut config, scenario_starts_sim) = match scenario.online_config() {
        Ok(Some(online)) => online,
        Ok(None) => return fail("Scenario has no online section", &"missing `online`"),
        Err(error) => return fail("Invalid online config", &error),
    };

    if let Some(name) = &args.transport_class {
        transport_name = name.clone();
    }
    if let Some(timeout_ms) = args.receive_timeout_ms {
        if timeout_ms == 0 {
            return fail("Invalid timeout", &"receive-timeout-ms must be positive");
        }
        config.receive_timeout = Duration::from_millis(timeout_ms);
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = capacity;
    }
    if let Some(path) = &args.transport_config {
        match load_properties(path) {
            Ok(properties) => config.session.properties.extend(properties),
            Err(error) => return fail("Cannot load transport config", &error),
        }
    }
    config
        .session
        .properties
        .extend(args.transport_prop.iter().cloned());

    // Entry stream belongs to the entry session, expected stream to the
    // exit session.
    let (input_dir, expected_dir) = match (&scenario.sessions.input_dir, &scenario.sessions.expected_dir) {
        (Some(input), Some(expected)) => (input.clone(), expected.clone()),
        _ => {
            return fail(
                "Online runs need sessions.input_dir and sessions.expected_dir",
                &"missing directories",
            )
        }
    };
    let scanner = Scanner::new(scenario.scan_config());
    let entry_key = config.session.entry_session.clone();
    let exit_key = config.session.exit_session.clone();
    let entry = match loader::load_session(&input_dir, &entry_key, &scanner, &config.filter) {
        Ok(entries) => entries,
        Err(error) => return fail("Cannot load entry stream", &error),
    };
    let expected = match loader::load_session(&expected_dir, &exit_key, &scanner, &config.filter) {
        Ok(entries) => entries,
        Err(error) => return fail("Cannot load expected stream", &error),
    };

    // Optionally bring up the embedded simulator and expose it as the
    // `sim` transport.
    let mut registry = TransportRegistry::new();
    let mut simulator: Option<Simulator> = None;
    if args.start_simulator || scenario_starts_sim {
        let Some(value) = scenario.simulator.clone() else {
            return fail("Simulator requested", &"scenario has no `simulator` section");
        };
        let sim_config = match SimulatorConfig::from_value(value) {
            Ok(sim_config) => sim_config,
            Err(error) => return fail("Invalid simulator config", &error),
        };
        if !sim_config.enabled {
            return fail("Simulator requested", &"simulator.enabled is false");
        }
        let factory = MemoryEngineFactory::new();
        let mut sim = match Simulator::new(sim_config.clone(), Box::new(factory.clone())) {
            Ok(sim) => sim,
            Err(error) => return fail("Cannot build simulator", &error),
        };
        if let Err(error) = sim.start().await {
            return fail("Cannot start simulator", &error);
        }
        simulator = Some(sim);
        registry.register(
            "sim",
            Box::new(move || {
                Box::new(SimulatorTransport::new(factory.clone(), sim_config.clone()))
            }),
        );
    }

    let mut transport = match registry.create(&transport_name) {
        Ok(transport) => transport,
        Err(error) => return fail("Cannot create transport", &error),
    };

    let cancel = CancelToken::new();
    let run_config = config.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let result = run_online(transport.as_mut(), &entry, &expected, &run_config, &cancel);
        (result, transport)
    })
    .await;

    if let Some(mut sim) = simulator {
        let _ = sim.stop().await;
    }

    let result = match outcome {
        Ok((Ok(result), _)) => result,
        Ok((Err(error), _)) => return fail("Online run failed", &error),
        Err(join_error) => return fail("Online run panicked", &join_error),
    };

    let report = RunReport::online(&result);
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

    info!(
        passed = report.passed,
        sent = result.sent,
        received = result.received,
        "Online run finished"
    );
    if report.passed {
        EXIT_OK
    } else {
        EXIT_COMPARE_FAILED
    }
}

fn load_properties(path: &PathBuf) -> Result<BTreeMap<String, String>, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string());
    let text = text?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        serde_json::from_str(&text).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&text).map_err(|e| e.to_string())
    }
}
