//! `.phasegate/config.toml`
//!
//! Every section is optional and defaulted. `Config::load` validates the
//! scoring table and queue TTL so a bad file fails before any state exists.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::planning::{Criterion, WeightTable};
use crate::validation::parse_ttl;

/// Written by `phasegate init`. Parses to `Config::default()`.
pub const DEFAULT_CONFIG: &str = r#"# phasegate configuration

[queue]
# Maximum number of entries kept by a planning pass
limit = 10
# Queue lifetime: 90s, 45m, 24h, 7d
ttl = "24h"

[gates]
# Allow approve-gate right after request-changes without new unit activity
allow_reapproval_without_rework = false

[executor]
# Shell command run for each work unit (PHASEGATE_* variables describe it)
# command = "./scripts/run-unit.sh"
timeout_secs = 3600

[signals]
timeout_secs = 300

[signals.commands]
# Gate signal name -> shell command, exit status 0 means true
# build = "cargo build"

[[scoring.criteria]]
name = "impact"
weight = 0.35
normalize = { kind = "linear", min = 0.0, max = 10.0 }

[[scoring.criteria]]
name = "urgency"
weight = 0.25
normalize = { kind = "linear", min = 0.0, max = 10.0 }

[[scoring.criteria]]
name = "confidence"
weight = 0.2
normalize = { kind = "ratio" }

[[scoring.criteria]]
name = "unlocks"
weight = 0.3
normalize = { kind = "count", cap = 5.0 }

[[scoring.criteria]]
name = "effort"
weight = -0.1
normalize = { kind = "linear", min = 0.0, max = 10.0 }
"#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub gates: GatePolicy,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_ttl")]
    pub ttl: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            ttl: default_ttl(),
        }
    }
}

fn default_limit() -> usize {
    10
}

fn default_ttl() -> String {
    "24h".to_string()
}

/// Gate decision policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Accept `approve-gate` after `request-changes` even when no unit
    /// activity happened in between.
    #[serde(default)]
    pub allow_reapproval_without_rework: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_unit_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_unit_timeout(),
        }
    }
}

fn default_unit_timeout() -> u64 {
    3600
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default = "default_signal_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_signal_timeout(),
            commands: BTreeMap::new(),
        }
    }
}

fn default_signal_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "WeightTable::default_criteria")]
    pub criteria: Vec<Criterion>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            criteria: WeightTable::default_criteria(),
        }
    }
}

impl Config {
    /// Load and validate `config.toml`. A missing file yields the defaults.
    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> EngineResult<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| EngineError::InvalidConfig(format!("config.toml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.weight_table()?;
        self.queue_ttl()?;
        if self.executor.timeout_secs == 0 || self.signals.timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn weight_table(&self) -> EngineResult<WeightTable> {
        WeightTable::new(self.scoring.criteria.clone())
    }

    pub fn queue_ttl(&self) -> EngineResult<Duration> {
        parse_ttl(&self.queue.ttl)
            .map_err(|e| EngineError::InvalidConfig(format!("queue.ttl: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::Normalizer;

    #[test]
    fn test_default_config_text_matches_defaults() {
        let parsed = Config::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, Config::default());
        assert_eq!(parsed.queue_ttl().unwrap(), Duration::hours(24));
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::load(&temp.path().join("config.toml")).unwrap();
        assert!(!config.gates.allow_reapproval_without_rework);
        assert_eq!(config.queue.limit, 10);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
[gates]
allow_reapproval_without_rework = true

[signals.commands]
lint = "make lint"

[[scoring.criteria]]
name = "impact"
weight = 1.0
"#,
        )
        .unwrap();
        assert!(config.gates.allow_reapproval_without_rework);
        assert_eq!(config.signals.commands["lint"], "make lint");
        assert_eq!(config.signals.timeout_secs, 300);
        assert_eq!(config.scoring.criteria.len(), 1);
        assert_eq!(config.scoring.criteria[0].normalize, Normalizer::default());
    }

    #[test]
    fn test_bad_weights_rejected_at_load() {
        let err = Config::parse(
            r#"
[[scoring.criteria]]
name = "impact"
weight = 0.5
"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidWeights(_)));
    }

    #[test]
    fn test_bad_ttl_rejected_at_load() {
        let err = Config::parse("[queue]\nttl = \"soon\"\n").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }
}
