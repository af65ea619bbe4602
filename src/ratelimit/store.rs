//! Per-client request history storage.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

/// Chronologically ordered request instants for one client.
///
/// Policies only push at the back and pop from the front, which keeps the
/// sequence sorted as long as callers feed non-decreasing instants.
pub type Timestamps = VecDeque<DateTime<Utc>>;

/// Request history for a single client identifier.
///
/// Every read and write of the timestamps goes through [`ClientHistory::lock`],
/// so two evaluations for the same client never interleave.
#[derive(Debug, Default)]
pub struct ClientHistory {
    timestamps: Mutex<Timestamps>,
}

impl ClientHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire this client's lock.
    pub fn lock(&self) -> MutexGuard<'_, Timestamps> {
        self.timestamps.lock()
    }

    /// Most recent recorded instant, if any.
    ///
    /// Takes the lock itself, so it must not be called while a guard from
    /// [`ClientHistory::lock`] is alive on the same thread.
    pub(crate) fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.timestamps.lock().back().copied()
    }
}

/// Concurrent map from client identifier to [`ClientHistory`].
///
/// The map is sharded (DashMap), so creating or looking up entries for
/// different clients does not contend on a single lock. Each entry carries its
/// own mutex; the shard lock is released before the history is locked.
///
/// A store is an ordinary owned value. Limiters that should see the same
/// history share an `Arc<ClientStore>`; limiters that should not get their own.
#[derive(Debug, Default)]
pub struct ClientStore {
    clients: DashMap<String, Arc<ClientHistory>>,
}

impl ClientStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Get the history for `client_id`, creating an empty one on first use.
    ///
    /// Creation happens under the shard's write lock, so concurrent first
    /// calls for the same identifier all receive the same history.
    pub fn get_or_create(&self, client_id: &str) -> Arc<ClientHistory> {
        if let Some(existing) = self.clients.get(client_id) {
            return Arc::clone(existing.value());
        }

        self.clients
            .entry(client_id.to_owned())
            .or_insert_with(|| {
                debug!(client = %client_id, "Tracking new client");
                Arc::new(ClientHistory::new())
            })
            .value()
            .clone()
    }

    /// Look up a client's history without creating it.
    pub fn get(&self, client_id: &str) -> Option<Arc<ClientHistory>> {
        self.clients.get(client_id).map(|h| Arc::clone(h.value()))
    }

    /// Check whether a client has been seen.
    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Copy of a client's recorded instants, oldest first.
    pub fn snapshot(&self, client_id: &str) -> Option<Vec<DateTime<Utc>>> {
        self.get(client_id)
            .map(|history| history.lock().iter().copied().collect())
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if no client is tracked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Forget every client.
    pub fn clear(&self) {
        self.clients.clear();
    }

    /// Drop clients that have been idle for longer than `idle_for`.
    ///
    /// A client is idle when its history is empty or its most recent instant
    /// is more than `idle_for` before `now`. Entries that an evaluation is
    /// holding at the moment of the sweep are kept, so a sweep can never split
    /// one client into two histories. Returns the number of clients removed.
    ///
    /// Evicting a client forgets its history and therefore resets its limits.
    /// Pick `idle_for` at least as long as the longest rule horizon: the
    /// largest sliding window, or a full day when a daily quota is active.
    ///
    /// Nothing calls this automatically; without it the store grows with every
    /// distinct identifier for the life of the process.
    pub fn evict_idle(&self, now: DateTime<Utc>, idle_for: Duration) -> usize {
        let before = self.clients.len();

        self.clients.retain(|_, history| {
            // Handles are only cloned under the shard lock we hold here, so a
            // count of one means no evaluation is in flight for this client.
            if Arc::strong_count(history) > 1 {
                return true;
            }
            match history.last_seen() {
                Some(last) => now - last <= idle_for,
                None => false,
            }
        });

        let evicted = before.saturating_sub(self.clients.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.clients.len(), "Evicted idle clients");
        }
        evicted
    }
}
