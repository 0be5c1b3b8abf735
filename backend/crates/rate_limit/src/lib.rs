//! Rate Limiting
//!
//! Fixed-window request counting shared by every rate-limited endpoint:
//! - Policies: named `(max, window)` quotas and the static registry
//! - Counter stores: a shared REST-backed store and an in-process fallback
//! - Evaluator: [`RateLimiter`], which counts a request and decides on it
//! - Client identification from request headers
//! - axum middleware producing the `429` + `Retry-After` response

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod policy;
pub mod store;

pub use client::{AuthenticatedUser, client_identifier, identifier_for};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FailureMode, RateLimitConfig, StoreConfig};
pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{RateLimitDecision, RateLimiter, UNKNOWN_IDENTIFIER};
pub use policy::{
    ALL_POLICIES, API_LIMIT, AUTH_LIMIT, CHAT_LIMIT, RateLimitPolicy, TTS_LIMIT, UPLOAD_LIMIT,
    policy_by_name,
};
pub use store::{
    AutoStore, Backend, CounterSnapshot, CounterStore, LocalCounterStore, MemoryStore, UpstashStore,
};
