//! Scenario files: one YAML or JSON document describing a verification
//! run — session directories, filtering, compare and linker policy, and
//! the optional online/simulator sections. Specs are plain serde structs;
//! `compile` turns them into the runtime configs with regexes built and
//! values validated.

use crate::compare::{default_exclude, CompareConfig};
use crate::error::{VerifyError, VerifyResult};
use crate::filter::MsgTypeFilter;
use crate::link::LinkerConfig;
use crate::normalize::{Normalizer, NormalizerSpec};
use crate::offline::OfflineConfig;
use crate::online::{OnlineConfig, TransportSessionConfig};
use fixlab_common::scan::{DelimiterRules, ScanConfig};
use fixlab_common::SessionKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root scenario document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub sessions: SessionsSpec,
    #[serde(default)]
    pub filter: FilterSpec,
    #[serde(default)]
    pub scan: ScanSpec,
    #[serde(default)]
    pub compare: CompareSpec,
    #[serde(default)]
    pub linker: LinkerSpec,
    #[serde(default)]
    pub online: Option<OnlineSpec>,
    /// Parsed by the simulator crate; kept opaque here.
    #[serde(default)]
    pub simulator: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsSpec {
    pub input_dir: Option<PathBuf>,
    pub expected_dir: Option<PathBuf>,
    pub actual_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    /// Allowed MsgType values; empty allows everything.
    #[serde(default)]
    pub msg_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelimiterName {
    #[serde(rename = "SOH")]
    Soh,
    #[serde(rename = "PIPE")]
    Pipe,
    #[serde(rename = "CARET_A")]
    CaretA,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanSpec {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Recognized delimiters; empty means all of them.
    #[serde(default)]
    pub delimiters: Vec<DelimiterName>,
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_max_message_length() -> usize {
    4096
}

impl Default for ScanSpec {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_message_length: default_max_message_length(),
            delimiters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompareSpec {
    /// When set, only these tags are compared.
    pub include: Option<Vec<u32>>,
    /// Overrides the default exclude set when present.
    pub exclude: Option<Vec<u32>>,
    #[serde(default)]
    pub per_msg_type: BTreeMap<String, PerTypeCompareSpec>,
    #[serde(default)]
    pub exclude_time_like_tags: bool,
    #[serde(default)]
    pub normalizers: BTreeMap<u32, NormalizerSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerTypeCompareSpec {
    #[serde(default)]
    pub include: Vec<u32>,
    #[serde(default)]
    pub exclude: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkerSpec {
    #[serde(default)]
    pub candidate_tags: Vec<u32>,
    #[serde(default)]
    pub combinations: Vec<Vec<u32>>,
    #[serde(default)]
    pub per_msg_type: BTreeMap<String, Vec<Vec<u32>>>,
    #[serde(default)]
    pub normalizers: BTreeMap<u32, NormalizerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnlineSpec {
    /// Transport factory name resolved against the registry.
    pub transport: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub entry: SessionEndpointSpec,
    pub exit: SessionEndpointSpec,
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Spin up the embedded simulator before connecting.
    #[serde(default)]
    pub start_simulator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionEndpointSpec {
    pub sender_comp_id: String,
    pub target_comp_id: String,
}

fn default_receive_timeout_ms() -> u64 {
    5_000
}

fn default_queue_capacity() -> usize {
    1_024
}

impl Scenario {
    /// Load a scenario from disk, picking the parser by extension.
    pub fn load(path: &Path) -> VerifyResult<Self> {
        let text = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            serde_json::from_str(&text)
                .map_err(|e| VerifyError::Config(format!("Invalid scenario JSON: {e}")))
        } else {
            serde_yaml::from_str(&text)
                .map_err(|e| VerifyError::Config(format!("Invalid scenario YAML: {e}")))
        }
    }

    pub fn filter(&self) -> MsgTypeFilter {
        MsgTypeFilter::new(self.filter.msg_types.iter().cloned())
    }

    pub fn scan_config(&self) -> ScanConfig {
        let delimiters = if self.scan.delimiters.is_empty() {
            DelimiterRules::default()
        } else {
            DelimiterRules {
                soh: self.scan.delimiters.contains(&DelimiterName::Soh),
                pipe: self.scan.delimiters.contains(&DelimiterName::Pipe),
                caret_a: self.scan.delimiters.contains(&DelimiterName::CaretA),
            }
        };
        ScanConfig {
            chunk_size: self.scan.chunk_size,
            max_message_length: self.scan.max_message_length,
            delimiters,
        }
    }

    pub fn compare_config(&self) -> VerifyResult<CompareConfig> {
        let spec = &self.compare;
        Ok(CompareConfig {
            default_include: spec
                .include
                .as_ref()
                .map(|tags| tags.iter().copied().collect()),
            default_exclude: match &spec.exclude {
                Some(tags) => tags.iter().copied().collect(),
                None => default_exclude(),
            },
            per_msg_type_include: spec
                .per_msg_type
                .iter()
                .filter(|(_, s)| !s.include.is_empty())
                .map(|(t, s)| (t.clone(), s.include.iter().copied().collect::<BTreeSet<_>>()))
                .collect(),
            per_msg_type_exclude: spec
                .per_msg_type
                .iter()
                .filter(|(_, s)| !s.exclude.is_empty())
                .map(|(t, s)| (t.clone(), s.exclude.iter().copied().collect::<BTreeSet<_>>()))
                .collect(),
            exclude_time_like_tags: spec.exclude_time_like_tags,
            normalizers: compile_normalizers(&spec.normalizers)?,
        })
    }

    pub fn linker_config(&self) -> VerifyResult<LinkerConfig> {
        let defaults = LinkerConfig::default();
        let spec = &self.linker;
        let config = LinkerConfig {
            candidate_tags: if spec.candidate_tags.is_empty() {
                defaults.candidate_tags
            } else {
                spec.candidate_tags.clone()
            },
            candidate_combinations: if spec.combinations.is_empty() {
                defaults.candidate_combinations
            } else {
                spec.combinations.clone()
            },
            per_msg_type: spec.per_msg_type.clone(),
            normalizers: compile_normalizers(&spec.normalizers)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Assemble the offline runner configuration. Input and expected
    /// directories are mandatory.
    pub fn offline_config(&self) -> VerifyResult<OfflineConfig> {
        let input_dir = self
            .sessions
            .input_dir
            .clone()
            .ok_or_else(|| VerifyError::Config("sessions.input_dir is required".to_string()))?;
        let expected_dir = self
            .sessions
            .expected_dir
            .clone()
            .ok_or_else(|| VerifyError::Config("sessions.expected_dir is required".to_string()))?;
        Ok(OfflineConfig {
            input_dir,
            expected_dir,
            actual_dir: self.sessions.actual_dir.clone(),
            filter: self.filter(),
            scan: self.scan_config(),
            linker: self.linker_config()?,
            compare: self.compare_config()?,
        })
    }

    /// Assemble the online runner configuration from the `online`
    /// section, when present.
    pub fn online_config(&self) -> VerifyResult<Option<(String, OnlineConfig, bool)>> {
        let Some(spec) = &self.online else {
            return Ok(None);
        };
        if spec.queue_capacity == 0 {
            return Err(VerifyError::Config(
                "online.queue_capacity must be positive".to_string(),
            ));
        }
        if spec.receive_timeout_ms == 0 {
            return Err(VerifyError::Config(
                "online.receive_timeout_ms must be positive".to_string(),
            ));
        }
        let mut session = TransportSessionConfig::new(
            endpoint_key(&spec.entry)?,
            endpoint_key(&spec.exit)?,
        );
        session.properties = spec.properties.clone();

        let mut config = OnlineConfig::new(session);
        config.receive_timeout = Duration::from_millis(spec.receive_timeout_ms);
        config.queue_capacity = spec.queue_capacity;
        config.filter = self.filter();
        config.linker = self.linker_config()?;
        config.compare = self.compare_config()?;
        Ok(Some((spec.transport.clone(), config, spec.start_simulator)))
    }
}

fn endpoint_key(spec: &SessionEndpointSpec) -> VerifyResult<SessionKey> {
    if spec.sender_comp_id.is_empty() || spec.target_comp_id.is_empty() {
        return Err(VerifyError::Config(
            "Session comp ids must be non-empty".to_string(),
        ));
    }
    Ok(SessionKey::new(
        spec.sender_comp_id.clone(),
        spec.target_comp_id.clone(),
    ))
}

fn compile_normalizers(
    specs: &BTreeMap<u32, NormalizerSpec>,
) -> VerifyResult<BTreeMap<u32, Normalizer>> {
    specs
        .iter()
        .map(|(&tag, spec)| Normalizer::compile(spec).map(|n| (tag, n)))
        .collect()
}
