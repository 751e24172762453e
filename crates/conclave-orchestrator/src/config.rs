use conclave_agent::{CircuitBreakerConfig, RetryPolicy, RoutingConfig, TemperatureConfig};
use conclave_core::{ConclaveError, ConclaveResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "conclave.toml";

/// Scheduling, timeout and retention limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Budget for one task's whole fallback chain.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Budget for a single chain step.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// Budget for the whole run.
    #[serde(default = "default_total_timeout_secs")]
    pub total_timeout_secs: u64,
    #[serde(default = "default_max_retained_results")]
    pub max_retained_results: usize,
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
    /// Where transcripts are archived; no archiving when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<PathBuf>,
}

fn default_max_concurrent() -> usize {
    4
}
fn default_max_queue_size() -> usize {
    64
}
fn default_task_timeout_secs() -> u64 {
    180
}
fn default_step_timeout_secs() -> u64 {
    90
}
fn default_total_timeout_secs() -> u64 {
    900
}
fn default_max_retained_results() -> usize {
    100
}
fn default_result_ttl_secs() -> u64 {
    3600
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue_size: default_max_queue_size(),
            task_timeout_secs: default_task_timeout_secs(),
            step_timeout_secs: default_step_timeout_secs(),
            total_timeout_secs: default_total_timeout_secs(),
            max_retained_results: default_max_retained_results(),
            result_ttl_secs: default_result_ttl_secs(),
            archive_dir: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn validate(&self) -> ConclaveResult<()> {
        if self.max_concurrent == 0 {
            return Err(ConclaveError::Config(
                "orchestrator.max_concurrent must be at least 1".into(),
            ));
        }
        if self.task_timeout_secs == 0 || self.step_timeout_secs == 0 || self.total_timeout_secs == 0
        {
            return Err(ConclaveError::Config(
                "orchestrator timeouts must be greater than zero".into(),
            ));
        }
        if self.max_retained_results == 0 {
            return Err(ConclaveError::Config(
                "orchestrator.max_retained_results must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConclaveConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub temperature: TemperatureConfig,
}

impl ConclaveConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> ConclaveResult<Self> {
        let config: ConclaveConfig = toml::from_str(content)
            .map_err(|e| ConclaveError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> ConclaveResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConclaveError::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConclaveError::Config(msg) => {
                ConclaveError::Config(format!("{msg} (in '{}')", path.display()))
            }
            other => other,
        })
    }

    pub fn validate(&self) -> ConclaveResult<()> {
        self.orchestrator.validate()?;
        self.breaker.validate()?;
        self.temperature.validate()?;
        Ok(())
    }

    /// Effective configuration as TOML.
    pub fn to_toml_string(&self) -> ConclaveResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConclaveError::Config(format!("Failed to render config: {e}")))
    }
}
