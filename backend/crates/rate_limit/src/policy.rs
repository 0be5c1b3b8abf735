//! Rate Limit Policies
//!
//! A policy is a named `(max requests, window length)` quota. The
//! application's call sites share the static policies declared here; the
//! limiter itself never hard-codes any of them.

use std::borrow::Cow;
use std::time::Duration;

use thiserror::Error;

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// General API - 100 requests / 15 minutes
pub static API_LIMIT: RateLimitPolicy = RateLimitPolicy::new("api", 100, 15 * MINUTE_MS);
/// Auth-adjacent endpoints - 10 requests / 15 minutes
pub static AUTH_LIMIT: RateLimitPolicy = RateLimitPolicy::new("auth", 10, 15 * MINUTE_MS);
/// File upload and parsing - 10 requests / hour
pub static UPLOAD_LIMIT: RateLimitPolicy = RateLimitPolicy::new("upload", 10, HOUR_MS);
/// AI chat - 50 requests / 15 minutes
pub static CHAT_LIMIT: RateLimitPolicy = RateLimitPolicy::new("chat", 50, 15 * MINUTE_MS);
/// Text-to-speech - 60 requests / 15 minutes
pub static TTS_LIMIT: RateLimitPolicy = RateLimitPolicy::new("tts", 60, 15 * MINUTE_MS);

/// Every statically declared policy.
pub static ALL_POLICIES: [&RateLimitPolicy; 5] =
    [&API_LIMIT, &AUTH_LIMIT, &UPLOAD_LIMIT, &CHAT_LIMIT, &TTS_LIMIT];

/// Look up a static policy by name.
pub fn policy_by_name(name: &str) -> Option<&'static RateLimitPolicy> {
    ALL_POLICIES.iter().copied().find(|p| p.name() == name)
}

/// Error building a policy at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Policy name must not be empty")]
    EmptyName,

    /// `:` separates the parts of a shared-store key
    #[error("Policy name must not contain ':': {0}")]
    InvalidName(String),

    #[error("Policy max must be at least 1")]
    ZeroMax,

    #[error("Policy window must be at least 1ms")]
    ZeroWindow,

    #[error("Policy window does not fit in u64 milliseconds")]
    WindowTooLarge,
}

/// Immutable rate limit quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    name: Cow<'static, str>,
    max: u32,
    window: Duration,
}

impl RateLimitPolicy {
    /// Declare a policy constant.
    ///
    /// Meant for `static`/`const` items: an empty or `:`-containing name, a
    /// zero `max` or a zero window panics during constant evaluation, which
    /// turns a bad declaration into a build error.
    pub const fn new(name: &'static str, max: u32, window_ms: u64) -> Self {
        assert!(!name.is_empty(), "rate limit policy name must not be empty");
        assert!(!has_separator(name), "rate limit policy name must not contain ':'");
        assert!(max >= 1, "rate limit policy max must be at least 1");
        assert!(window_ms >= 1, "rate limit policy window must be at least 1ms");
        Self {
            name: Cow::Borrowed(name),
            max,
            window: Duration::from_millis(window_ms),
        }
    }

    /// Build a policy from runtime values.
    ///
    /// ## Errors
    /// Returns [`PolicyError`] when any of the invariants `new` enforces at
    /// compile time is violated.
    pub fn try_new(
        name: impl Into<Cow<'static, str>>,
        max: u32,
        window: Duration,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PolicyError::EmptyName);
        }
        if has_separator(&name) {
            return Err(PolicyError::InvalidName(name.into_owned()));
        }
        if max == 0 {
            return Err(PolicyError::ZeroMax);
        }
        if window.as_millis() == 0 {
            return Err(PolicyError::ZeroWindow);
        }
        if u64::try_from(window.as_millis()).is_err() {
            return Err(PolicyError::WindowTooLarge);
        }
        Ok(Self { name, max, window })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }

    /// Key expiry for the shared store, rounded up to whole seconds.
    pub fn expiry_secs(&self) -> u64 {
        self.window_ms().div_ceil(1000)
    }
}

const fn has_separator(name: &str) -> bool {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b':' {
            return true;
        }
        i += 1;
    }
    false
}
