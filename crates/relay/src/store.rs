//! Correlation store - completed results keyed by work id.
//!
//! Results are written by the executor and taken exactly once by the
//! submitter waiting on the same id. Waiters register a `Notify` so a
//! deposit wakes them directly instead of waiting for the next poll.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::work::RelayResult;

struct StoredResult {
    result: RelayResult,
    deposited_at: Instant,
}

/// Lock-free result store with per-id wake-ups.
#[derive(Default)]
pub struct CorrelationStore {
    results: DashMap<String, StoredResult>,
    waiters: DashMap<String, Arc<Notify>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the result for `id`.
    ///
    /// Returns true if a submitter is currently waiting on the id.
    pub fn put(&self, id: String, result: RelayResult) -> bool {
        self.results.insert(
            id.clone(),
            StoredResult {
                result,
                deposited_at: Instant::now(),
            },
        );

        match self.waiters.get(&id) {
            Some(waiter) => {
                // notify_one stores a permit, so a waiter that has not reached
                // its await point yet still wakes immediately.
                waiter.notify_one();
                true
            }
            None => false,
        }
    }

    /// Atomically remove and return the result for `id`.
    pub fn try_take(&self, id: &str) -> Option<RelayResult> {
        self.results.remove(id).map(|(_, stored)| stored.result)
    }

    pub fn register_waiter(&self, id: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.waiters.insert(id.to_string(), Arc::clone(&notify));
        notify
    }

    pub fn unregister_waiter(&self, id: &str) {
        self.waiters.remove(id);
    }

    pub fn is_awaited(&self, id: &str) -> bool {
        self.waiters.contains_key(id)
    }

    pub fn awaiting(&self) -> usize {
        self.waiters.len()
    }

    /// Number of results deposited but not yet taken.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Drop unclaimed results older than `max_age`. Returns how many were removed.
    pub fn purge_expired(&self, max_age: Duration) -> usize {
        let expired: Vec<String> = self
            .results
            .iter()
            .filter(|entry| entry.deposited_at.elapsed() >= max_age)
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .into_iter()
            .filter(|id| {
                self.results
                    .remove_if(id, |_, stored| stored.deposited_at.elapsed() >= max_age)
                    .is_some()
            })
            .count()
    }
}
