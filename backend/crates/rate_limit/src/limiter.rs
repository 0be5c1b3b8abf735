//! Rate Limit Evaluator
//!
//! Counts one request for an `(identifier, policy)` pair and decides whether
//! it is within quota. Counting is delegated to a [`CounterStore`].

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, FailureMode, RateLimitConfig};
use crate::error::RateLimitResult;
use crate::policy::RateLimitPolicy;
use crate::store::{AutoStore, CounterSnapshot, CounterStore};

/// Identifier used when a client cannot be identified.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Outcome of one rate limit evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// The request is within quota
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Policy maximum per window
    pub limit: u32,
    /// Time until the current window ends
    pub reset_in: Duration,
}

impl RateLimitDecision {
    fn from_snapshot(policy: &RateLimitPolicy, snapshot: CounterSnapshot) -> Self {
        let max = u64::from(policy.max());
        Self {
            allowed: snapshot.count <= max,
            remaining: max.saturating_sub(snapshot.count) as u32,
            limit: policy.max(),
            reset_in: Duration::from_millis(snapshot.reset_in_ms.min(policy.window_ms())),
        }
    }

    /// Decision used when the store is down and the limiter fails open.
    fn unchecked(policy: &RateLimitPolicy) -> Self {
        Self {
            allowed: true,
            remaining: policy.max(),
            limit: policy.max(),
            reset_in: policy.window(),
        }
    }

    pub fn reset_in_ms(&self) -> u64 {
        u64::try_from(self.reset_in.as_millis()).unwrap_or(u64::MAX)
    }

    /// Value for the `Retry-After` header: `ceil(reset_in / 1s)`.
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_in_ms().div_ceil(1000)
    }
}

/// Rate limiter over a counter store.
///
/// ## Example
/// ```rust
/// use rate_limit::{RateLimiter, RateLimitPolicy, MemoryStore};
///
/// # block_on(async {
/// let limiter = RateLimiter::new(MemoryStore::new());
/// let policy = RateLimitPolicy::new("burst", 3, 1000);
///
/// let decision = limiter.evaluate("u1", &policy).await.unwrap();
/// assert!(decision.allowed);
/// assert_eq!(decision.remaining, 2);
/// # });
/// # fn block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter<S = AutoStore> {
    store: S,
    clock: Arc<dyn Clock>,
    failure_mode: FailureMode,
}

impl RateLimiter<AutoStore> {
    /// Limiter whose backend is selected lazily from `config`.
    pub fn from_config(config: RateLimitConfig) -> Self {
        Self::new(AutoStore::new(config.store)).with_failure_mode(config.failure_mode)
    }

    /// Limiter configured from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::from_config(RateLimitConfig::from_env()?))
    }

    /// Evict ended windows from the in-process store.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(self.clock.now_millis())
    }
}

impl<S> RateLimiter<S>
where
    S: CounterStore + Sync,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            failure_mode: FailureMode::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Count this request and decide whether it is allowed.
    ///
    /// The request that pushes the count past `policy.max()` is itself
    /// rejected, and rejected requests still count. A blank identifier is
    /// counted as [`UNKNOWN_IDENTIFIER`].
    ///
    /// ## Errors
    /// Store failures are returned unchanged; see [`RateLimiter::check`] for
    /// the variant that applies the configured [`FailureMode`].
    pub async fn evaluate(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> RateLimitResult<RateLimitDecision> {
        let identifier = match identifier.trim() {
            "" => UNKNOWN_IDENTIFIER,
            _ => identifier,
        };

        let now_ms = self.clock.now_millis();
        let snapshot = self.store.increment(policy, identifier, now_ms).await?;
        let decision = RateLimitDecision::from_snapshot(policy, snapshot);

        if !decision.allowed {
            tracing::warn!(
                policy = policy.name(),
                identifier = identifier,
                count = snapshot.count,
                max = policy.max(),
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// [`RateLimiter::evaluate`], with store failures handled per [`FailureMode`].
    ///
    /// In [`FailureMode::Open`] this never returns an error.
    pub async fn check(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> RateLimitResult<RateLimitDecision> {
        match self.evaluate(identifier, policy).await {
            Ok(decision) => Ok(decision),
            Err(e) => match self.failure_mode {
                FailureMode::Open => {
                    tracing::warn!(
                        error = %e,
                        policy = policy.name(),
                        "Rate limit store failed, allowing request"
                    );
                    Ok(RateLimitDecision::unchecked(policy))
                }
                FailureMode::Closed => {
                    tracing::error!(
                        error = %e,
                        policy = policy.name(),
                        "Rate limit store failed, rejecting request"
                    );
                    Err(e)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;
    use crate::error::RateLimitError;
    use crate::policy::{CHAT_LIMIT, UPLOAD_LIMIT};
    use crate::store::{MemoryStore, StoreError};

    /// Store that always fails, standing in for an unreachable shared store.
    struct DownStore;

    impl CounterStore for DownStore {
        async fn increment(
            &self,
            _policy: &RateLimitPolicy,
            _identifier: &str,
            _now_ms: u64,
        ) -> Result<CounterSnapshot, StoreError> {
            Err(StoreError::Status {
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    fn limiter_at(now_ms: u64) -> (RateLimiter<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now_ms));
        let limiter = RateLimiter::new(MemoryStore::new()).with_clock(clock.clone());
        (limiter, clock)
    }

    fn summary(d: RateLimitDecision) -> (bool, u32) {
        (d.allowed, d.remaining)
    }

    #[tokio::test]
    async fn test_boundary_request_is_rejected() {
        let (limiter, _) = limiter_at(0);
        let policy = RateLimitPolicy::new("burst", 3, 1000);

        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(summary(limiter.evaluate("u1", &policy).await.unwrap()));
        }

        assert_eq!(results, vec![(true, 2), (true, 1), (true, 0), (false, 0)]);
    }

    #[tokio::test]
    async fn test_monotonic_counting() {
        let (limiter, _) = limiter_at(1_000_000);
        let policy = RateLimitPolicy::new("mono", 5, 60_000);

        for i in 1..=8u32 {
            let decision = limiter.evaluate("u1", &policy).await.unwrap();
            assert_eq!(decision.allowed, i <= 5);
            assert_eq!(decision.remaining, 5u32.saturating_sub(i));
            assert_eq!(decision.limit, 5);
        }
    }

    #[tokio::test]
    async fn test_identifiers_are_isolated() {
        let (limiter, _) = limiter_at(0);
        let policy = RateLimitPolicy::new("iso", 2, 1000);

        for _ in 0..3 {
            limiter.evaluate("a", &policy).await.unwrap();
        }
        assert!(!limiter.evaluate("a", &policy).await.unwrap().allowed);

        let b = limiter.evaluate("b", &policy).await.unwrap();
        assert!(b.allowed);
        assert_eq!(b.remaining, 1);
    }

    #[tokio::test]
    async fn test_policies_are_isolated() {
        let (limiter, _) = limiter_at(0);

        for _ in 0..CHAT_LIMIT.max() + 1 {
            limiter.evaluate("u1", &CHAT_LIMIT).await.unwrap();
        }
        assert!(!limiter.evaluate("u1", &CHAT_LIMIT).await.unwrap().allowed);

        let upload = limiter.evaluate("u1", &UPLOAD_LIMIT).await.unwrap();
        assert!(upload.allowed);
        assert_eq!(upload.remaining, UPLOAD_LIMIT.max() - 1);
    }

    #[tokio::test]
    async fn test_window_rollover() {
        let (limiter, clock) = limiter_at(10_000);
        let policy = RateLimitPolicy::new("roll", 2, 1000);

        for _ in 0..3 {
            limiter.evaluate("u1", &policy).await.unwrap();
        }
        assert!(!limiter.evaluate("u1", &policy).await.unwrap().allowed);

        clock.advance(policy.window());
        let decision = limiter.evaluate("u1", &policy).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, policy.max() - 1);
    }

    #[tokio::test]
    async fn test_reset_time_within_window() {
        let (limiter, clock) = limiter_at(0);
        let policy = RateLimitPolicy::new("bound", 3, 1000);

        for step in 0..25u64 {
            let decision = limiter.evaluate("u1", &policy).await.unwrap();
            assert!(decision.reset_in <= policy.window());
            clock.advance(Duration::from_millis(step * 37 % 400));
        }
    }

    #[tokio::test]
    async fn test_retry_after_rounds_up() {
        let (limiter, clock) = limiter_at(0);
        let policy = RateLimitPolicy::new("retry", 1, 10_000);

        limiter.evaluate("u1", &policy).await.unwrap();
        clock.advance(Duration::from_millis(2_500));
        let decision = limiter.evaluate("u1", &policy).await.unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reset_in_ms(), 7_500);
        assert_eq!(decision.retry_after_secs(), 8);
    }

    #[tokio::test]
    async fn test_blank_identifier_counts_as_unknown() {
        let (limiter, _) = limiter_at(0);
        let policy = RateLimitPolicy::new("anon", 5, 1000);

        limiter.evaluate("", &policy).await.unwrap();
        limiter.evaluate("  ", &policy).await.unwrap();
        let decision = limiter.evaluate(UNKNOWN_IDENTIFIER, &policy).await.unwrap();

        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn test_evaluate_propagates_store_errors() {
        let limiter = RateLimiter::new(DownStore);
        let result = limiter.evaluate("u1", &CHAT_LIMIT).await;
        assert!(matches!(result, Err(RateLimitError::Store(_))));
    }

    #[tokio::test]
    async fn test_check_fails_open() {
        let limiter = RateLimiter::new(DownStore).with_failure_mode(FailureMode::Open);
        let decision = limiter.check("u1", &CHAT_LIMIT).await.unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, CHAT_LIMIT.max());
        assert_eq!(decision.reset_in, CHAT_LIMIT.window());
    }

    #[tokio::test]
    async fn test_check_fails_closed() {
        let limiter = RateLimiter::new(DownStore).with_failure_mode(FailureMode::Closed);
        assert!(limiter.check("u1", &CHAT_LIMIT).await.is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_limiter_always_usable() {
        let config = RateLimitConfig {
            store: StoreConfig::local(),
            failure_mode: FailureMode::Closed,
        };
        let limiter = RateLimiter::from_config(config);
        let policy = RateLimitPolicy::new("local", 2, 60_000);

        for _ in 0..10 {
            limiter.evaluate("u1", &policy).await.unwrap();
        }
        assert!(!limiter.store().backend().is_shared());
        assert_eq!(limiter.failure_mode(), FailureMode::Closed);
    }

    #[tokio::test]
    async fn test_purge_expired_uses_limiter_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::from_config(RateLimitConfig::default()).with_clock(clock.clone());
        let policy = RateLimitPolicy::new("sweep", 2, 1000);

        limiter.evaluate("a", &policy).await.unwrap();
        limiter.evaluate("b", &policy).await.unwrap();
        assert_eq!(limiter.purge_expired(), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.purge_expired(), 2);
    }
}
