//! Top-level simulator: topology detection, runtime startup with a
//! bounded deadline, readiness, and ordered shutdown.

use crate::config::SimulatorConfig;
use crate::engine::{BackendFactory, RuntimeBinding};
use crate::error::{ErrorCell, SimResult, SimulatorError};
use crate::mutation::MutationEngine;
use crate::registry::SessionRegistry;
use crate::router::Router;
use crate::runtime::{EndpointRuntime, RuntimeHandler, RuntimeRole, RuntimeShared};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Per-runtime startup deadline.
const STARTUP_DEADLINE: Duration = Duration::from_secs(15);

/// A FIX gateway stand-in: every message accepted on the entry session
/// is routed through the mutation pipeline to the exit session.
pub struct Simulator {
    config: SimulatorConfig,
    factory: Box<dyn BackendFactory>,
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    errors: Arc<ErrorCell>,
    running: Arc<AtomicBool>,
    runtimes: Vec<EndpointRuntime>,
    startup_deadline: Duration,
    started: bool,
}

impl Simulator {
    pub fn new(config: SimulatorConfig, factory: Box<dyn BackendFactory>) -> SimResult<Self> {
        config.validate()?;

        let mutation = if config.mutation.enabled {
            let strict = config.mutation.strict_mode;
            let engine = if !config.mutation.rules_inline.is_empty() {
                MutationEngine::compile(&config.mutation.rules_inline, strict)?
            } else if let Some(path) = &config.mutation.rules_file {
                MutationEngine::load_file(path, strict)?
            } else {
                MutationEngine::compile(&[], strict)?
            };
            info!(rules = engine.rule_count(), strict, "Mutation engine ready");
            Some(engine)
        } else {
            None
        };

        let registry = Arc::new(SessionRegistry::new());
        let errors = Arc::new(ErrorCell::new());
        let router = Arc::new(Router::new(
            &config,
            mutation,
            Arc::clone(&registry),
            Arc::clone(&errors),
        ));

        Ok(Self {
            config,
            factory,
            registry,
            router,
            errors,
            running: Arc::new(AtomicBool::new(false)),
            runtimes: Vec::new(),
            startup_deadline: STARTUP_DEADLINE,
            started: false,
        })
    }

    /// Bind the runtimes the topology needs, spawn their poll tasks and
    /// wait for every library client to connect.
    pub async fn start(&mut self) -> SimResult<()> {
        if self.started {
            return Err(SimulatorError::Startup(
                "Simulator already started".to_string(),
            ));
        }
        self.prepare_directories()?;
        self.running.store(true, Ordering::SeqCst);

        let entry_key = self.config.entry.session_key();
        let exit_key = self.config.exit.session_key();
        let plans: Vec<(RuntimeBinding, RuntimeRole)> = if self.config.is_single_port() {
            info!(port = self.config.entry.listen_port, "Single-port topology");
            vec![(binding_of(&self.config, true), RuntimeRole::Both)]
        } else {
            info!(
                entry_port = self.config.entry.listen_port,
                exit_port = self.config.exit.listen_port,
                "Dual-port topology"
            );
            vec![
                (binding_of(&self.config, true), RuntimeRole::Entry),
                (binding_of(&self.config, false), RuntimeRole::Exit),
            ]
        };

        for (binding, role) in plans {
            let started = self.spawn_runtime(&binding, role, &entry_key, &exit_key);
            if let Err(error) = started {
                self.shutdown_tasks().await;
                return Err(error);
            }
        }

        // Bounded wait for the engine handshake on every runtime.
        let deadline = Instant::now() + self.startup_deadline;
        while !self
            .runtimes
            .iter()
            .all(|r| r.shared.is_library_connected())
        {
            if Instant::now() >= deadline {
                let error = SimulatorError::Startup(format!(
                    "Library connect timed out after {:?}",
                    self.startup_deadline
                ));
                self.shutdown_tasks().await;
                return Err(error);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        self.started = true;
        info!("Simulator started");
        Ok(())
    }

    fn spawn_runtime(
        &mut self,
        binding: &RuntimeBinding,
        role: RuntimeRole,
        entry_key: &fixlab_common::SessionKey,
        exit_key: &fixlab_common::SessionKey,
    ) -> SimResult<()> {
        let mut backend = self.factory.create(binding)?;
        backend.start()?;

        let shared = Arc::new(RuntimeShared::new(role));
        let handler = RuntimeHandler::new(
            role,
            entry_key.clone(),
            exit_key.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.router),
            Arc::clone(&shared),
        );
        let runtime = EndpointRuntime::spawn(
            backend,
            handler,
            shared,
            Arc::clone(&self.running),
            self.config.artio.performance.inbound_fragment_limit,
            Arc::clone(&self.errors),
        );
        self.runtimes.push(runtime);
        Ok(())
    }

    /// Signal the poll tasks, wait up to the graceful timeout, then
    /// clean up directories. Cleanup failures are suppressed (logged,
    /// latched) rather than raised.
    pub async fn stop(&mut self) -> SimResult<()> {
        info!("Stopping simulator");
        self.shutdown_tasks().await;

        if self.config.artio.delete_on_stop {
            for dir in [
                &self.config.artio.log_dir,
                &self.config.artio.aeron_dir,
                &self.config.artio.work_dir,
            ] {
                remove_dir_suppressed(dir);
            }
        }
        self.started = false;
        Ok(())
    }

    async fn shutdown_tasks(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let grace = Duration::from_millis(self.config.shutdown.graceful_timeout_ms);
        for runtime in &mut self.runtimes {
            if let Some(handle) = runtime.take_handle() {
                match tokio::time::timeout(grace, handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(join_error)) => {
                        self.errors
                            .record(SimulatorError::Shutdown(join_error.to_string()));
                    }
                    Err(_) => {
                        self.errors.record(SimulatorError::Shutdown(format!(
                            "Poll task did not stop within {grace:?}"
                        )));
                    }
                }
            }
        }
        self.runtimes.clear();
    }

    fn prepare_directories(&self) -> SimResult<()> {
        let artio = &self.config.artio;
        if artio.delete_on_start {
            for dir in [&artio.log_dir, &artio.aeron_dir, &artio.work_dir] {
                remove_dir_suppressed(dir);
            }
        }
        for dir in [&artio.work_dir, &artio.aeron_dir, &artio.log_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Both sessions acquired and connected, with no latched error.
    pub fn is_ready(&self) -> bool {
        self.started && self.registry.both_connected() && !self.errors.is_set()
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.describe()
    }

    pub fn queue_depth(&self) -> usize {
        self.router.queue_depth()
    }

    pub fn observed_sessions(&self) -> usize {
        self.registry.observed_count()
    }
}

fn binding_of(config: &SimulatorConfig, entry: bool) -> RuntimeBinding {
    let endpoint = if entry { &config.entry } else { &config.exit };
    RuntimeBinding {
        host: endpoint.listen_host.clone(),
        port: endpoint.listen_port,
    }
}

fn remove_dir_suppressed(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "Suppressed directory cleanup failure"),
    }
}
