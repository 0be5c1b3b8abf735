//! Backend selection
//!
//! The shared store is used when both of its credentials are configured and
//! a client can be built from them. Anything else, including a construction
//! failure, degrades to the in-process store. Selection never fails.

use std::sync::OnceLock;

use super::{CounterSnapshot, CounterStore, MemoryStore, StoreError, UpstashStore};
use crate::config::StoreConfig;
use crate::policy::RateLimitPolicy;

/// The counter store chosen for this process.
#[derive(Debug)]
pub enum Backend {
    Shared(UpstashStore),
    Local(MemoryStore),
}

impl Backend {
    /// Pick a backend from configuration.
    pub fn select(config: &StoreConfig) -> Self {
        if !config.has_shared_credentials() {
            tracing::info!("Shared rate limit store not configured, using in-memory counters");
            return Backend::Local(MemoryStore::new());
        }

        match UpstashStore::from_config(config) {
            Ok(store) => {
                tracing::info!(endpoint = %store.endpoint(), "Using shared rate limit store");
                Backend::Shared(store)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Shared rate limit store unusable, falling back to in-memory counters"
                );
                Backend::Local(MemoryStore::new())
            }
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Backend::Shared(_))
    }

    /// The in-process store, if that is what was selected.
    pub fn local(&self) -> Option<&MemoryStore> {
        match self {
            Backend::Local(store) => Some(store),
            Backend::Shared(_) => None,
        }
    }
}

impl CounterStore for Backend {
    async fn increment(
        &self,
        policy: &RateLimitPolicy,
        identifier: &str,
        now_ms: u64,
    ) -> Result<CounterSnapshot, StoreError> {
        match self {
            Backend::Shared(store) => store.increment(policy, identifier, now_ms).await,
            Backend::Local(store) => store.increment(policy, identifier, now_ms).await,
        }
    }
}

/// Counter store that selects its backend on first use and keeps it.
///
/// The choice is made at most once per `AutoStore`; a process normally owns a
/// single one through its limiter.
#[derive(Debug)]
pub struct AutoStore {
    config: StoreConfig,
    backend: OnceLock<Backend>,
}

impl AutoStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            backend: OnceLock::new(),
        }
    }

    /// Selected backend, resolving it if this is the first call.
    pub fn backend(&self) -> &Backend {
        self.backend.get_or_init(|| Backend::select(&self.config))
    }

    /// Whether a backend has been selected yet.
    pub fn is_resolved(&self) -> bool {
        self.backend.get().is_some()
    }

    /// Evict ended windows from the in-process store. No-op for the shared store.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        self.backend
            .get()
            .and_then(Backend::local)
            .map_or(0, |store| store.purge_expired(now_ms))
    }
}

impl CounterStore for AutoStore {
    async fn increment(
        &self,
        policy: &RateLimitPolicy,
        identifier: &str,
        now_ms: u64,
    ) -> Result<CounterSnapshot, StoreError> {
        self.backend().increment(policy, identifier, now_ms).await
    }
}
