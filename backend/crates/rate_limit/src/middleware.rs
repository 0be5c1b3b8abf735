//! Rate Limit Middleware
//!
//! axum middleware applying one policy to a set of routes. Rejected requests
//! get `429 Too Many Requests` with a `Retry-After` header (whole seconds,
//! rounded up) and a JSON body; accepted requests carry `X-RateLimit-Limit`
//! and `X-RateLimit-Remaining`.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use kernel::error::app_error::AppError;

use crate::client::{AuthenticatedUser, client_identifier, identifier_for};
use crate::limiter::RateLimiter;
use crate::policy::RateLimitPolicy;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

const DEFAULT_MESSAGE: &str = "Too many requests.";

/// Middleware state
#[derive(Clone)]
pub struct RateLimitLayerState {
    pub limiter: Arc<RateLimiter>,
    pub policy: &'static RateLimitPolicy,
    pub message: &'static str,
}

impl RateLimitLayerState {
    pub fn new(limiter: Arc<RateLimiter>, policy: &'static RateLimitPolicy) -> Self {
        Self {
            limiter,
            policy,
            message: DEFAULT_MESSAGE,
        }
    }

    /// Message returned to rejected clients.
    pub fn with_message(mut self, message: &'static str) -> Self {
        self.message = message;
        self
    }
}

/// Middleware that counts each request against the state's policy
pub async fn enforce(
    State(state): State<RateLimitLayerState>,
    req: Request,
    next: Next,
) -> Response {
    let identifier = match req.extensions().get::<AuthenticatedUser>() {
        Some(user) => identifier_for(Some(&user.0), req.headers()),
        None => client_identifier(req.headers()),
    };

    let decision = match state.limiter.check(&identifier, state.policy).await {
        Ok(decision) => decision,
        Err(e) => return AppError::from(e).into_response(),
    };

    if !decision.allowed {
        return AppError::too_many_requests(state.message)
            .with_retry_after(decision.reset_in)
            .into_response();
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    response
}

/// Apply `policy` to every route currently registered on `router`.
pub fn limit<S>(
    router: Router<S>,
    limiter: Arc<RateLimiter>,
    policy: &'static RateLimitPolicy,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    limit_with(router, RateLimitLayerState::new(limiter, policy))
}

/// [`limit`] with a fully specified state (e.g. a custom message).
pub fn limit_with<S>(router: Router<S>, state: RateLimitLayerState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(state, enforce))
}
