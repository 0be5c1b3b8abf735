//! Shared counter store over a Redis-compatible REST API (Upstash)
//!
//! Each command is POSTed to the endpoint as a JSON array, e.g.
//! `["INCR", "rl:chat:user-1:1939402"]`, with a bearer token. Replies are
//! `{"result": ...}` on success or `{"error": "..."}` on failure.
//!
//! Windows are fixed and aligned to multiples of the policy window: every
//! identifier's count for a policy resets at the same instant.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{CounterSnapshot, CounterStore, StoreError};
use crate::config::StoreConfig;
use crate::policy::RateLimitPolicy;

/// Reply envelope of the REST API
#[derive(Debug, Deserialize)]
struct Reply<T> {
    result: Option<T>,
    error: Option<String>,
}

/// Key of the counter for one `(policy, identifier, window bucket)`.
pub fn window_key(policy: &RateLimitPolicy, identifier: &str, bucket: u64) -> String {
    format!("rl:{}:{}:{}", policy.name(), identifier, bucket)
}

/// Counter store shared by every process pointing at the same endpoint.
#[derive(Clone)]
pub struct UpstashStore {
    client: Client,
    endpoint: Url,
    token: String,
}

impl UpstashStore {
    /// Build a client for `url`, authenticating with `token`.
    ///
    /// ## Errors
    /// [`StoreError::InvalidConfig`] if the URL is not http(s), the token is
    /// blank, or the HTTP client cannot be built.
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, StoreError> {
        let endpoint = Url::parse(url.trim())
            .map_err(|e| StoreError::InvalidConfig(format!("invalid URL {url:?}: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(StoreError::InvalidConfig(format!(
                "unsupported URL scheme: {}",
                endpoint.scheme()
            )));
        }
        if token.trim().is_empty() {
            return Err(StoreError::InvalidConfig("empty token".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            token: token.trim().to_string(),
        })
    }

    /// Build from configuration. Fails if either credential is missing.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        match (&config.rest_url, &config.rest_token) {
            (Some(url), Some(token)) => Self::new(url, token, config.request_timeout),
            _ => Err(StoreError::InvalidConfig(
                "shared store URL or token missing".to_string(),
            )),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn command<T: DeserializeOwned>(&self, args: &[Value]) -> Result<T, StoreError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            // Error replies usually still carry the JSON envelope
            let message = serde_json::from_slice::<Reply<Value>>(&body)
                .ok()
                .and_then(|reply| reply.error)
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            return Err(StoreError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let reply: Reply<T> = serde_json::from_slice(&body)
            .map_err(|e| StoreError::UnexpectedResponse(e.to_string()))?;

        match reply {
            Reply {
                error: Some(error), ..
            } => Err(StoreError::Backend(error)),
            Reply {
                result: Some(result),
                ..
            } => Ok(result),
            _ => Err(StoreError::UnexpectedResponse(
                "reply has neither result nor error".to_string(),
            )),
        }
    }
}

impl fmt::Debug for UpstashStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstashStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl CounterStore for UpstashStore {
    async fn increment(
        &self,
        policy: &RateLimitPolicy,
        identifier: &str,
        now_ms: u64,
    ) -> Result<CounterSnapshot, StoreError> {
        let window_ms = policy.window_ms();
        let bucket = now_ms / window_ms;
        let key = window_key(policy, identifier, bucket);

        let count: i64 = self.command(&[json!("INCR"), json!(key)]).await?;
        let count = u64::try_from(count)
            .map_err(|_| StoreError::UnexpectedResponse(format!("negative counter {count}")))?;

        if count == 1 {
            // Separate round trip: if it fails the key keeps no TTL, but the
            // bucket index is part of the key so it is never counted again.
            // Rounded up so a sub-second remainder never leaves the key immortal.
            let _: i64 = self
                .command(&[json!("EXPIRE"), json!(key), json!(policy.expiry_secs())])
                .await?;
            tracing::debug!(key = %key, ttl_secs = policy.expiry_secs(), "Opened rate limit window");
        }

        let window_end = bucket.saturating_add(1).saturating_mul(window_ms);
        Ok(CounterSnapshot {
            count,
            reset_in_ms: window_end.saturating_sub(now_ms),
        })
    }
}
