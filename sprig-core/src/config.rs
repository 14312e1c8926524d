//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object (or no configuration at
//! all) yields a working runtime.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for a Sprig runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub scheduler: SchedulerConfig,
    pub renderer: RendererConfig,
}

/// Scheduler settings. Applied per thread via [`crate::scheduler::configure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// How many times a flush may re-drain the queue when jobs enqueue more
    /// jobs. Exceeding it drops what is left and reports an error.
    pub max_flush_rounds: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: 100,
        }
    }
}

/// Reconciler settings. Owned by each [`crate::render::Renderer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    pub warn_on_duplicate_keys: bool,
    /// Comment text mounted in place of a component whose first render fails.
    pub error_placeholder: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            warn_on_duplicate_keys: true,
            error_placeholder: "render error".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.max_flush_rounds == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.max_flush_rounds",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Apply the scheduler settings to the current thread's queue. Renderer
    /// settings are passed to [`crate::render::Renderer::with_config`].
    pub fn install(&self) {
        crate::scheduler::configure(self.scheduler.clone());
    }
}
