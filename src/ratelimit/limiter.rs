//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::policy::Policy;
use super::rules::RuleSet;
use super::store::ClientStore;
use crate::error::Result;

/// Admits or denies requests per client by evaluating an ordered list of
/// policies against that client's history.
///
/// Every active policy is evaluated on every call, even after one of them has
/// denied, and the results are combined with a logical AND. All policies of
/// a limiter read and write the same per-client history, so rules interact:
/// an admission recorded by one rule counts toward the others.
///
/// This struct is thread-safe and can be shared across threads behind an
/// `Arc`. Calls for the same client are serialized on that client's lock;
/// calls for different clients run in parallel.
#[derive(Debug)]
pub struct RateLimiter {
    /// Active policies in evaluation order
    rules: RwLock<Vec<Policy>>,
    /// Per-client request history
    store: Arc<ClientStore>,
    /// Source of "now" for `is_allowed`
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter with no rules, its own store and the system clock.
    ///
    /// With no rules every request is admitted.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            store: Arc::new(ClientStore::new()),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Create a limiter with the given rules.
    pub fn with_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = Policy>,
    {
        let limiter = Self::new();
        *limiter.rules.write() = rules.into_iter().collect();
        limiter
    }

    /// Create a limiter from rule definitions, validating every rule.
    pub fn from_rules(rules: &RuleSet) -> Result<Self> {
        Ok(Self::with_rules(rules.to_policies()?))
    }

    /// Limiter admitting at most `capacity` requests per client in any
    /// trailing `window`.
    pub fn sliding_window(capacity: usize, window: Duration) -> Result<Self> {
        Ok(Self::with_rules([Policy::sliding_window(capacity, window)?]))
    }

    /// Limiter admitting at most `capacity` requests per client per UTC day.
    pub fn daily_quota(capacity: usize) -> Self {
        Self::with_rules([Policy::daily_quota(capacity)])
    }

    /// Limiter requiring at least `interval` between a client's admitted
    /// requests.
    pub fn cooldown(interval: Duration) -> Result<Self> {
        Ok(Self::with_rules([Policy::cooldown(interval)?]))
    }

    /// Use `store` for client history instead of a private one.
    ///
    /// Limiters built over the same store see each other's admissions.
    pub fn with_store(mut self, store: Arc<ClientStore>) -> Self {
        self.store = store;
        self
    }

    /// Use `clock` as the time source for [`RateLimiter::is_allowed`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Decide whether a request from `client_id` is admitted now.
    pub fn is_allowed(&self, client_id: &str) -> bool {
        let now = self.clock.now();
        self.is_allowed_at(client_id, now)
    }

    /// Decide whether a request from `client_id` at `now` is admitted.
    ///
    /// `now` must not go backwards between calls for the same client.
    pub fn is_allowed_at(&self, client_id: &str, now: DateTime<Utc>) -> bool {
        let rules = self.rules.read();
        if rules.is_empty() {
            trace!(client = %client_id, "No active rules, admitting");
            return true;
        }

        let history = self.store.get_or_create(client_id);
        let mut timestamps = history.lock();

        // No short-circuit: later rules still trim and record.
        let mut allowed = true;
        for policy in rules.iter() {
            let admitted = policy.evaluate(&mut timestamps, now);
            trace!(
                client = %client_id,
                rule = %policy,
                admitted,
                "Evaluated rule"
            );
            allowed &= admitted;
        }

        if !allowed {
            debug!(
                client = %client_id,
                recorded = timestamps.len(),
                "Rate limit exceeded"
            );
        }
        allowed
    }

    /// Append a rule to the end of the evaluation order.
    pub fn add_rule(&self, policy: Policy) {
        let mut rules = self.rules.write();
        rules.push(policy);
        debug!(rule = %policy, active = rules.len(), "Added rule");
    }

    /// Remove every rule. Subsequent requests are all admitted.
    pub fn remove_all(&self) {
        let mut rules = self.rules.write();
        let removed = rules.len();
        rules.clear();
        debug!(removed, "Removed all rules");
    }

    /// Number of active rules.
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Copy of the active rules in evaluation order.
    pub fn rules(&self) -> Vec<Policy> {
        self.rules.read().clone()
    }

    /// The store holding client history.
    pub fn store(&self) -> &Arc<ClientStore> {
        &self.store
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
