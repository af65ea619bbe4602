//! Configuration management for Warden.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::ratelimit::{RuleConfig, RuleSet};

/// Prefix for environment overrides, e.g. `WARDEN__LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "WARDEN";

/// Main configuration for the Warden binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path to a YAML rules file
    #[serde(default)]
    pub rules_path: Option<String>,

    /// Rules declared inline, evaluated after those from `rules_path`
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl WardenConfig {
    /// Load configuration from an optional file, then apply `WARDEN__*`
    /// environment overrides.
    ///
    /// The file format is taken from its extension (YAML, TOML or JSON).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Reading settings file");
            builder = builder.add_source(::config::File::from(path));
        }

        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Assemble the rule set: rules from `rules_path` first, then inline ones.
    pub fn rule_set(&self) -> Result<RuleSet> {
        let mut set = match &self.rules_path {
            Some(path) => RuleSet::from_file(path)?,
            None => RuleSet::new(),
        };
        set.rules.extend(self.rules.iter().cloned());
        Ok(set)
    }
}
