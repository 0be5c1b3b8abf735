//! Counter Stores
//!
//! A counter store owns the per-(policy, identifier, window) request counts.
//! Two interchangeable backends implement [`CounterStore`]:
//! - [`UpstashStore`]: shared, network-backed, atomic across processes
//! - [`MemoryStore`]: in-process fallback, correct within one process only
//!
//! [`AutoStore`] picks one of them from configuration on first use.

pub mod memory;
pub mod select;
pub mod upstash;

pub use memory::MemoryStore;
pub use select::{AutoStore, Backend};
pub use upstash::UpstashStore;

use crate::policy::RateLimitPolicy;
use thiserror::Error;

/// Counter state right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Count including the increment that produced this snapshot
    pub count: u64,
    /// Milliseconds until the current window ends
    pub reset_in_ms: u64,
}

/// Counter store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store could not be constructed from its configuration
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Request never produced a response (connect error, timeout, ...)
    #[error("Store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Store answered with a non-success HTTP status
    #[error("Store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Store accepted the request but reported a command error
    #[error("Store command failed: {0}")]
    Backend(String),

    /// Response body did not have the expected shape
    #[error("Unexpected store response: {0}")]
    UnexpectedResponse(String),
}

/// Trait for counter storage backends
#[trait_variant::make(CounterStore: Send)]
pub trait LocalCounterStore {
    /// Count one request for `identifier` under `policy` at `now_ms`.
    ///
    /// Every call increments exactly once, including calls that end up over
    /// the limit.
    async fn increment(
        &self,
        policy: &RateLimitPolicy,
        identifier: &str,
        now_ms: u64,
    ) -> Result<CounterSnapshot, StoreError>;
}
