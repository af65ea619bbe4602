//! Rate limit rule definitions and loading.
//!
//! Rules are declared in YAML and turned into [`Policy`] values once, at
//! construction time, so every parameter error surfaces before the first
//! request is evaluated.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::policy::Policy;
use crate::error::{Result, WardenError};

/// An ordered list of rule definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    /// Rules in evaluation order
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// A single rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleConfig {
    /// At most `capacity` requests in any trailing `window` units of time.
    SlidingWindow {
        capacity: usize,
        window: u64,
        #[serde(default)]
        unit: TimeUnit,
    },
    /// At most `capacity` requests per UTC day.
    DailyQuota { capacity: usize },
    /// At least `interval` units of time between admitted requests.
    Cooldown {
        interval: u64,
        #[serde(default)]
        unit: TimeUnit,
    },
}

/// Time unit for rule durations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Millisecond,
    #[default]
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Duration of `amount` of this unit, or `None` on overflow.
    pub fn times(self, amount: u64) -> Option<Duration> {
        let millis_per_unit: u64 = match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
        };
        amount.checked_mul(millis_per_unit).map(Duration::from_millis)
    }
}

impl RuleConfig {
    /// Validate this definition and build the policy it describes.
    pub fn to_policy(&self) -> Result<Policy> {
        match *self {
            RuleConfig::SlidingWindow {
                capacity,
                window,
                unit,
            } => Policy::sliding_window(capacity, scaled("window", window, unit)?),
            RuleConfig::DailyQuota { capacity } => Ok(Policy::daily_quota(capacity)),
            RuleConfig::Cooldown { interval, unit } => {
                Policy::cooldown(scaled("interval", interval, unit)?)
            }
        }
    }
}

fn scaled(name: &str, amount: u64, unit: TimeUnit) -> Result<Duration> {
    unit.times(amount).ok_or_else(|| {
        WardenError::Config(format!("{} of {} {:?} overflows", name, amount, unit))
    })
}

fn parse_error(e: serde_yaml::Error) -> WardenError {
    WardenError::Config(format!("Failed to parse rate limit rules: {}", e))
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    ///
    /// Accepts either a mapping with a `rules` key or a bare list of rules.
    /// Unknown keys are rejected rather than ignored.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(parse_error)?;

        if document.is_sequence() {
            let rules = serde_yaml::from_value::<Vec<RuleConfig>>(document).map_err(parse_error)?;
            return Ok(RuleSet { rules });
        }

        serde_yaml::from_value(document).map_err(parse_error)
    }

    /// Validate every rule and build the policies, preserving order.
    ///
    /// The first invalid rule aborts the whole set.
    pub fn to_policies(&self) -> Result<Vec<Policy>> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                rule.to_policy().map_err(|e| match e {
                    WardenError::Config(msg) => {
                        WardenError::Config(format!("rule #{}: {}", index + 1, msg))
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
