//! Simulator configuration tree. Key names are identical whether the
//! document arrives as JSON or YAML.

use crate::error::{SimResult, SimulatorError};
use crate::mutation::RuleSpec;
use fixlab_common::SessionKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The only transport provider this build knows how to drive.
pub const PROVIDER_ARTIO: &str = "artio";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatorConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_begin_string")]
    pub begin_string: String,
    pub entry: EndpointConfig,
    pub exit: EndpointConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub mutation: MutationConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub artio: ArtioConfig,
}

fn default_provider() -> String {
    PROVIDER_ARTIO.to_string()
}

fn default_begin_string() -> String {
    "FIX.4.4".to_string()
}

/// One listening FIX endpoint of the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    pub listen_port: u16,
    pub local_comp_id: String,
    pub remote_comp_id: String,
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

impl EndpointConfig {
    /// The (local, remote) identity an acquired session must carry.
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.local_comp_id.clone(), self.remote_comp_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// MsgTypes admitted to routing; empty admits everything.
    #[serde(default)]
    pub enabled_msg_types: Vec<String>,
    #[serde(default = "default_true")]
    pub drop_admin_messages: bool,
    /// Sleep injected before each exit send.
    #[serde(default)]
    pub artificial_delay_ms: u64,
    /// Treat an entry message with no exit session as an error instead
    /// of queueing it.
    #[serde(default)]
    pub fail_if_exit_not_logged_on: bool,
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_queue_depth() -> usize {
    1_024
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled_msg_types: Vec::new(),
            drop_admin_messages: true,
            artificial_delay_ms: 0,
            fail_if_exit_not_logged_on: false,
            max_queue_depth: default_max_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strict_mode: bool,
    /// Inline rules win over `rules_file`; an empty inline list falls
    /// back to the file.
    #[serde(default)]
    pub rules_inline: Vec<RuleSpec>,
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_inbound_outbound: bool,
    #[serde(default)]
    pub log_fix_payloads: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    #[serde(default = "default_graceful_timeout_ms")]
    pub graceful_timeout_ms: u64,
}

fn default_graceful_timeout_ms() -> u64 {
    5_000
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout_ms: default_graceful_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtioConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_aeron_dir")]
    pub aeron_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub delete_on_start: bool,
    #[serde(default)]
    pub delete_on_stop: bool,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("sim-work")
}

fn default_aeron_dir() -> PathBuf {
    PathBuf::from("sim-work/aeron")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("sim-work/logs")
}

impl Default for ArtioConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            aeron_dir: default_aeron_dir(),
            log_dir: default_log_dir(),
            delete_on_start: false,
            delete_on_stop: false,
            performance: PerformanceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceConfig {
    #[serde(default = "default_fragment_limit")]
    pub inbound_fragment_limit: usize,
    #[serde(default = "default_fragment_limit")]
    pub outbound_fragment_limit: usize,
    #[serde(default = "default_idle_strategy")]
    pub idle_strategy: String,
}

fn default_fragment_limit() -> usize {
    10
}

fn default_idle_strategy() -> String {
    "backoff".to_string()
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            inbound_fragment_limit: default_fragment_limit(),
            outbound_fragment_limit: default_fragment_limit(),
            idle_strategy: default_idle_strategy(),
        }
    }
}

impl SimulatorConfig {
    /// Parse the `simulator` subtree of a scenario document.
    pub fn from_value(value: serde_yaml::Value) -> SimResult<Self> {
        serde_yaml::from_value(value)
            .map_err(|e| SimulatorError::Config(format!("Invalid simulator config: {e}")))
    }

    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            serde_json::from_str(&text)
                .map_err(|e| SimulatorError::Config(format!("Invalid simulator JSON: {e}")))
        } else {
            serde_yaml::from_str(&text)
                .map_err(|e| SimulatorError::Config(format!("Invalid simulator YAML: {e}")))
        }
    }

    /// Single-port topology shares one runtime between both roles.
    pub fn is_single_port(&self) -> bool {
        self.entry.listen_port == self.exit.listen_port
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.provider != PROVIDER_ARTIO {
            return Err(SimulatorError::Config(format!(
                "Unsupported provider {:?} (expected {PROVIDER_ARTIO:?})",
                self.provider
            )));
        }
        for (role, endpoint) in [("entry", &self.entry), ("exit", &self.exit)] {
            if endpoint.local_comp_id.is_empty() || endpoint.remote_comp_id.is_empty() {
                return Err(SimulatorError::Config(format!(
                    "{role} comp ids must be non-empty"
                )));
            }
        }
        if self.entry.session_key() == self.exit.session_key() {
            return Err(SimulatorError::Config(
                "entry and exit sessions must have distinct identities".to_string(),
            ));
        }
        if self.routing.max_queue_depth == 0 {
            return Err(SimulatorError::Config(
                "routing.max_queue_depth must be positive".to_string(),
            ));
        }
        if self.shutdown.graceful_timeout_ms == 0 {
            return Err(SimulatorError::Config(
                "shutdown.graceful_timeout_ms must be positive".to_string(),
            ));
        }
        if self.artio.performance.inbound_fragment_limit == 0
            || self.artio.performance.outbound_fragment_limit == 0
        {
            return Err(SimulatorError::Config(
                "artio.performance fragment limits must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
