//! Warden - Per-Client Request Rate Limiter
//!
//! This crate decides whether a request from a given client should be
//! admitted. Decisions come from composable rules (sliding window, daily
//! quota and cooldown) evaluated against each client's request history, which
//! is kept in memory and guarded by a per-client lock.
//!
//! ```
//! use std::time::Duration;
//! use warden::ratelimit::{Policy, RateLimiter};
//!
//! let limiter = RateLimiter::sliding_window(3, Duration::from_secs(30))?;
//! limiter.add_rule(Policy::daily_quota(1000));
//!
//! assert!(limiter.is_allowed("client-a"));
//! # Ok::<(), warden::error::WardenError>(())
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;
