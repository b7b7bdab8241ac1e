use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use crate::collector::ConfiguredSource;
use crate::error::{DiagError, DiagResult};
use crate::evaluate::{ThresholdRule, ThresholdTable};
use crate::source::SourcePolicy;
use crate::sources::{builtin_descriptors, sources_for, SourceScope};
use crate::subsystem::Subsystem;

/// Upper bound on attempts per source, retries included.
pub const MAX_ATTEMPTS: u32 = 5;

/// Top-level config file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    /// Enabled subsystems; also the section order of the report.
    #[serde(default = "default_subsystems")]
    pub subsystems: Vec<Subsystem>,
    #[serde(default)]
    pub scope: SourceScope,
    #[serde(default)]
    pub collector: CollectorSettings,
    /// Per-source overrides keyed by source id.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceOverride>,
    /// Per-metric threshold overrides, merged over the defaults.
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Backend-specific connection settings (parsed by the target adapter).
    pub connection: serde_yaml::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Default per-attempt deadline.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceOverride {
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub retry_delay: Option<Duration>,
}

fn default_subsystems() -> Vec<Subsystem> {
    Subsystem::ALL.to_vec()
}

fn default_max_in_flight() -> usize {
    4
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            subsystems: default_subsystems(),
            scope: SourceScope::default(),
            collector: CollectorSettings::default(),
            sources: BTreeMap::new(),
            thresholds: BTreeMap::new(),
        }
    }
}

impl PulseConfig {
    pub fn from_file(path: &Path) -> DiagResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiagError::Config(format!("Cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> DiagResult<Self> {
        serde_yaml::from_str(content).map_err(|e| DiagError::Config(format!("Invalid YAML: {e}")))
    }

    /// Reject anything that would make a collection cycle ill-defined.
    pub fn validate(&self) -> DiagResult<()> {
        if self.targets.is_empty() {
            return Err(DiagError::Config("no targets configured".into()));
        }
        if self.subsystems.is_empty() {
            return Err(DiagError::Config("no subsystems enabled".into()));
        }
        let mut seen = BTreeSet::new();
        for subsystem in &self.subsystems {
            if !seen.insert(subsystem) {
                return Err(DiagError::Config(format!(
                    "subsystem '{subsystem}' listed more than once"
                )));
            }
        }
        if self.collector.max_in_flight == 0 {
            return Err(DiagError::Config("collector.max_in_flight must be at least 1".into()));
        }
        if self.collector.timeout.is_zero() {
            return Err(DiagError::Config("collector.timeout must be non-zero".into()));
        }

        let known: BTreeSet<String> = builtin_descriptors().into_iter().map(|d| d.id).collect();
        for (id, over) in &self.sources {
            if !known.contains(id) {
                return Err(DiagError::Config(format!("unknown source '{id}'")));
            }
            if over.timeout.is_some_and(|t| t.is_zero()) {
                return Err(DiagError::Config(format!("source '{id}': timeout must be non-zero")));
            }
            if let Some(attempts) = over.max_attempts {
                if !(1..=MAX_ATTEMPTS).contains(&attempts) {
                    return Err(DiagError::Config(format!(
                        "source '{id}': max_attempts must be between 1 and {MAX_ATTEMPTS}"
                    )));
                }
            }
        }

        self.threshold_table().map(|_| ())
    }

    pub fn policy_for(&self, source_id: &str) -> SourcePolicy {
        let defaults = SourcePolicy {
            timeout: self.collector.timeout,
            ..SourcePolicy::default()
        };
        match self.sources.get(source_id) {
            Some(over) => SourcePolicy {
                timeout: over.timeout.unwrap_or(defaults.timeout),
                max_attempts: over.max_attempts.unwrap_or(defaults.max_attempts),
                retry_delay: over.retry_delay.unwrap_or(defaults.retry_delay),
            },
            None => defaults,
        }
    }

    pub fn threshold_table(&self) -> DiagResult<ThresholdTable> {
        ThresholdTable::with_overrides(&self.thresholds)
    }

    /// Built-in sources for the enabled subsystems, each with its policy.
    pub fn configured_sources(&self) -> Vec<ConfiguredSource> {
        sources_for(&self.subsystems, &self.scope)
            .into_iter()
            .map(|source| {
                let policy = self.policy_for(&source.descriptor().id);
                ConfiguredSource::new(source, policy)
            })
            .collect()
    }
}
