//! Rate Limiter Configuration
//!
//! Read from the process environment once at startup. Missing shared-store
//! credentials are not an error (the limiter falls back to the in-process
//! store); malformed tuning values are, so a typo fails loudly at boot.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Shared store endpoint, e.g. `https://eu1-example.upstash.io`
pub const REST_URL_VAR: &str = "UPSTASH_REDIS_REST_URL";
/// Shared store bearer token
pub const REST_TOKEN_VAR: &str = "UPSTASH_REDIS_REST_TOKEN";
/// Per-request timeout for the shared store, in milliseconds
pub const STORE_TIMEOUT_VAR: &str = "RATE_LIMIT_STORE_TIMEOUT_MS";
/// `open` or `closed`
pub const FAILURE_MODE_VAR: &str = "RATE_LIMIT_ON_STORE_ERROR";

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// What the limiter does when the counter store itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Let the request through and log a warning.
    #[default]
    Open,
    /// Surface the store error to the caller.
    Closed,
}

impl FromStr for FailureMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailureMode::Open),
            "closed" => Ok(FailureMode::Closed),
            _ => Err(()),
        }
    }
}

/// Counter store connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Shared store REST endpoint
    pub rest_url: Option<String>,
    /// Shared store bearer token
    pub rest_token: Option<String>,
    /// Timeout applied to every shared store request
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            rest_url: None,
            rest_token: None,
            request_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Local-only configuration (no shared store).
    pub fn local() -> Self {
        Self::default()
    }

    /// Configuration pointing at a shared store.
    pub fn shared(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            rest_url: Some(url.into()),
            rest_token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Both credentials are present.
    pub fn has_shared_credentials(&self) -> bool {
        self.rest_url.is_some() && self.rest_token.is_some()
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("rest_url", &self.rest_url)
            .field("rest_token", &self.rest_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Full limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RateLimitConfig {
    pub store: StoreConfig,
    pub failure_mode: FailureMode,
}

impl RateLimitConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let request_timeout = match get(STORE_TIMEOUT_VAR) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: STORE_TIMEOUT_VAR,
                        value: raw,
                    });
                }
            },
            None => DEFAULT_STORE_TIMEOUT,
        };

        let failure_mode = match get(FAILURE_MODE_VAR) {
            Some(raw) => raw.parse().map_err(|()| ConfigError::InvalidValue {
                var: FAILURE_MODE_VAR,
                value: raw.clone(),
            })?,
            None => FailureMode::default(),
        };

        Ok(Self {
            store: StoreConfig {
                rest_url: get(REST_URL_VAR),
                rest_token: get(REST_TOKEN_VAR),
                request_timeout,
            },
            failure_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RateLimitConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RateLimitConfig::default());
        assert!(!config.store.has_shared_credentials());
        assert_eq!(config.failure_mode, FailureMode::Open);
        assert_eq!(config.store.request_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_shared_credentials() {
        let config = RateLimitConfig::from_lookup(lookup(&[
            (REST_URL_VAR, "https://example.upstash.io"),
            (REST_TOKEN_VAR, "secret"),
        ]))
        .unwrap();
        assert!(config.store.has_shared_credentials());
        assert_eq!(
            config.store.rest_url.as_deref(),
            Some("https://example.upstash.io")
        );
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = RateLimitConfig::from_lookup(lookup(&[
            (REST_URL_VAR, "https://example.upstash.io"),
            (REST_TOKEN_VAR, "   "),
        ]))
        .unwrap();
        assert!(config.store.rest_token.is_none());
        assert!(!config.store.has_shared_credentials());
    }

    #[test]
    fn test_tuning_values() {
        let config = RateLimitConfig::from_lookup(lookup(&[
            (STORE_TIMEOUT_VAR, "500"),
            (FAILURE_MODE_VAR, "Closed"),
        ]))
        .unwrap();
        assert_eq!(config.store.request_timeout, Duration::from_millis(500));
        assert_eq!(config.failure_mode, FailureMode::Closed);
    }

    #[test]
    fn test_invalid_tuning_values() {
        let err = RateLimitConfig::from_lookup(lookup(&[(STORE_TIMEOUT_VAR, "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: STORE_TIMEOUT_VAR,
                value: "soon".to_string()
            }
        );

        assert!(RateLimitConfig::from_lookup(lookup(&[(STORE_TIMEOUT_VAR, "0")])).is_err());
        assert!(RateLimitConfig::from_lookup(lookup(&[(FAILURE_MODE_VAR, "maybe")])).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = StoreConfig::shared("https://example.upstash.io", "super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
