//! Layered configuration loading for the orchestration core.
//!
//! Sources, lowest to highest precedence: `config/default.toml`,
//! `.env` (via `dotenvy`), then `ORCHESTRATOR_`-prefixed environment
//! variables (e.g. `ORCHESTRATOR_MAX_CONCURRENT_TASKS=16`).

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use orch_domain::enums::{ErrorType, RecoveryStrategy};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_channels")]
    pub defaults: Vec<String>,
    #[serde(default = "default_min_priority")]
    pub min_priority: String,
}

fn default_true() -> bool {
    true
}

fn default_channels() -> Vec<String> {
    vec!["system_log".to_string()]
}

fn default_min_priority() -> String {
    "low".to_string()
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            defaults: default_channels(),
            min_priority: default_min_priority(),
        }
    }
}

/// Per-error-type recovery policy override.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryPolicyOverride {
    pub strategy: RecoveryStrategy,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
    #[serde(default)]
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RecoveryConfig {
    #[serde(default)]
    pub overrides: HashMap<ErrorType, RecoveryPolicyOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Top-level orchestrator configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Step names the Step Executor Registry should flag as
    /// long-running for scheduling/timeout purposes.
    #[serde(default)]
    pub long_running_steps: Vec<String>,
    /// Per-step soft timeout, in milliseconds. Steps not listed use
    /// the registry's declared default.
    #[serde(default)]
    pub step_timeouts: HashMap<String, u64>,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_database_url() -> String {
    "postgres://localhost/orchestrator".to_string()
}

impl OrchestratorConfig {
    /// Load configuration from `config/default.toml`, `.env`, and
    /// `ORCHESTRATOR_`-prefixed environment overrides, then validate it.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("ORCHESTRATOR").separator("__"))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.admission.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "admission.queue_capacity must be at least 1".to_string(),
            ));
        }
        for step in &self.long_running_steps {
            if orch_domain::state_token::Phase::parse(step).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "long_running_steps references unknown step: {step}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_concurrency() {
        let cfg = OrchestratorConfig {
            max_concurrent_tasks: 0,
            long_running_steps: vec![],
            step_timeouts: HashMap::new(),
            channels: ChannelsConfig::default(),
            recovery: RecoveryConfig::default(),
            admission: AdmissionConfig::default(),
            database_url: default_database_url(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_long_running_step() {
        let cfg = OrchestratorConfig {
            max_concurrent_tasks: 4,
            long_running_steps: vec!["not_a_real_step".to_string()],
            step_timeouts: HashMap::new(),
            channels: ChannelsConfig::default(),
            recovery: RecoveryConfig::default(),
            admission: AdmissionConfig::default(),
            database_url: default_database_url(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_accepts_sane_defaults() {
        let cfg = OrchestratorConfig {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            long_running_steps: vec!["code_generation".to_string()],
            step_timeouts: HashMap::new(),
            channels: ChannelsConfig::default(),
            recovery: RecoveryConfig::default(),
            admission: AdmissionConfig::default(),
            database_url: default_database_url(),
        };
        assert!(cfg.validate().is_ok());
    }
}
