//! In-process counter store
//!
//! Fallback used when no shared store is configured. Windows start at the
//! first request of each identifier (not on wall-clock boundaries), and the
//! counts live only as long as the process.

use dashmap::DashMap;

use super::{CounterSnapshot, CounterStore, StoreError};
use crate::policy::RateLimitPolicy;

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    /// Epoch ms at which the window ends
    reset_at_ms: u64,
}

/// In-memory counter store.
///
/// One map per policy name, each keyed by identifier. The read-modify-write
/// of a single counter happens under its shard lock, so concurrent requests
/// for the same key never lose an increment.
#[derive(Debug, Default)]
pub struct MemoryStore {
    policies: DashMap<String, DashMap<String, CounterEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous core of [`CounterStore::increment`].
    pub fn increment_now(
        &self,
        policy: &RateLimitPolicy,
        identifier: &str,
        now_ms: u64,
    ) -> CounterSnapshot {
        let window_ms = policy.window_ms();

        let counters = match self.policies.get(policy.name()) {
            Some(counters) => counters,
            None => self
                .policies
                .entry(policy.name().to_owned())
                .or_default()
                .downgrade(),
        };

        let mut entry = counters
            .entry(identifier.to_owned())
            .or_insert(CounterEntry {
                count: 0,
                reset_at_ms: 0,
            });

        if entry.count == 0 || now_ms >= entry.reset_at_ms {
            *entry = CounterEntry {
                count: 1,
                reset_at_ms: now_ms.saturating_add(window_ms),
            };
        } else {
            entry.count = entry.count.saturating_add(1);
        }

        CounterSnapshot {
            count: entry.count,
            // Clamped in case the clock stepped backwards
            reset_in_ms: entry.reset_at_ms.saturating_sub(now_ms).min(window_ms),
        }
    }

    /// Drop every counter whose window has ended. Returns how many were removed.
    ///
    /// Nothing else ever evicts entries, so identifiers that never come back
    /// would otherwise stay in memory for the life of the process.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let mut removed = 0;
        for counters in self.policies.iter() {
            counters.retain(|_, entry| {
                let live = entry.reset_at_ms > now_ms;
                if !live {
                    removed += 1;
                }
                live
            });
        }
        self.policies.retain(|_, counters| !counters.is_empty());
        removed
    }

    /// Number of live counters across all policies.
    pub fn len(&self) -> usize {
        self.policies.iter().map(|counters| counters.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CounterStore for MemoryStore {
    async fn increment(
        &self,
        policy: &RateLimitPolicy,
        identifier: &str,
        now_ms: u64,
    ) -> Result<CounterSnapshot, StoreError> {
        Ok(self.increment_now(policy, identifier, now_ms))
    }
}
