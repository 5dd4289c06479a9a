//! Engine configuration
//!
//! Loaded from the environment (`SEMU_*`) or from a YAML file.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Emit one `trace`-level event per executed step.
    pub trace_steps: bool,
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace_steps: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            trace_steps: env_bool("SEMU_TRACE_STEPS", false),
            log_filter: std::env::var("SEMU_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse engine configuration")
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), trace_steps = config.trace_steps, "Loaded engine configuration");
        Ok(config)
    }

    /// Install a global fmt subscriber filtered by `log_filter`.
    ///
    /// Fails if the filter does not parse or a subscriber is already installed.
    pub fn init_tracing(&self) -> Result<()> {
        let filter = tracing_subscriber::EnvFilter::try_new(&self.log_filter)
            .with_context(|| format!("Invalid log filter '{}'", self.log_filter))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| anyhow!(e))
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}
