//! Rate limit policies.
//!
//! A policy is an immutable set of parameters plus one decision procedure.
//! It owns no state: every call works on the caller-supplied history of a
//! single client, which the caller must already have locked.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use super::store::Timestamps;
use crate::error::{Result, WardenError};

/// A rate limit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// At most `capacity` admissions within any trailing `window`.
    SlidingWindow { capacity: usize, window: Duration },
    /// At most `capacity` admissions per UTC calendar day.
    DailyQuota { capacity: usize },
    /// At least `interval` between consecutive admissions.
    Cooldown { interval: Duration },
}

impl Policy {
    /// Create a sliding window policy.
    ///
    /// A capacity of zero is accepted and denies every request. The window
    /// must be strictly positive.
    pub fn sliding_window(capacity: usize, window: std::time::Duration) -> Result<Self> {
        let window = positive_duration("window", window)?;
        Ok(Policy::SlidingWindow { capacity, window })
    }

    /// Create a daily quota policy. A capacity of zero denies every request.
    pub fn daily_quota(capacity: usize) -> Self {
        Policy::DailyQuota { capacity }
    }

    /// Create a cooldown policy. The interval must be strictly positive.
    pub fn cooldown(interval: std::time::Duration) -> Result<Self> {
        let interval = positive_duration("interval", interval)?;
        Ok(Policy::Cooldown { interval })
    }

    /// Short name of the policy kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Policy::SlidingWindow { .. } => "sliding_window",
            Policy::DailyQuota { .. } => "daily_quota",
            Policy::Cooldown { .. } => "cooldown",
        }
    }

    /// Decide whether a request at `now` is admitted, recording it if so.
    ///
    /// Denials leave the history untouched, except that the sliding window
    /// drops entries that have aged out of its window before deciding.
    pub fn evaluate(&self, history: &mut Timestamps, now: DateTime<Utc>) -> bool {
        match *self {
            Policy::SlidingWindow { capacity, window } => {
                evaluate_sliding_window(history, now, capacity, window)
            }
            Policy::DailyQuota { capacity } => evaluate_daily_quota(history, now, capacity),
            Policy::Cooldown { interval } => evaluate_cooldown(history, now, interval),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::SlidingWindow { capacity, window } => write!(
                f,
                "sliding_window(capacity={}, window={}ms)",
                capacity,
                window.num_milliseconds()
            ),
            Policy::DailyQuota { capacity } => write!(f, "daily_quota(capacity={})", capacity),
            Policy::Cooldown { interval } => {
                write!(f, "cooldown(interval={}ms)", interval.num_milliseconds())
            }
        }
    }
}

fn positive_duration(name: &str, value: std::time::Duration) -> Result<Duration> {
    if value.is_zero() {
        return Err(WardenError::Config(format!("{} must be greater than zero", name)));
    }
    Duration::from_std(value)
        .map_err(|_| WardenError::Config(format!("{} of {:?} is out of range", name, value)))
}

fn evaluate_sliding_window(
    history: &mut Timestamps,
    now: DateTime<Utc>,
    capacity: usize,
    window: Duration,
) -> bool {
    // An entry exactly `window` old still counts.
    while let Some(&oldest) = history.front() {
        if now - oldest > window {
            history.pop_front();
        } else {
            break;
        }
    }

    if history.len() < capacity {
        history.push_back(now);
        true
    } else {
        false
    }
}

fn evaluate_daily_quota(history: &mut Timestamps, now: DateTime<Utc>, capacity: usize) -> bool {
    let today = now.date_naive();
    let used_today = history.iter().filter(|t| t.date_naive() == today).count();

    if used_today < capacity {
        history.push_back(now);
        true
    } else {
        false
    }
}

fn evaluate_cooldown(history: &mut Timestamps, now: DateTime<Utc>, interval: Duration) -> bool {
    let ready = match history.back() {
        Some(&last) => now - last >= interval,
        None => true,
    };

    if ready {
        history.push_back(now);
    }
    ready
}
