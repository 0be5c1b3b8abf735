//! Rate Limiter Error Types
//!
//! Library errors, and their mapping onto the unified `kernel::error::AppError`.

use kernel::error::app_error::AppError;
use thiserror::Error;

use crate::store::StoreError;

/// Rate limiter result type alias
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors surfaced by [`crate::RateLimiter`]
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The counter store failed while counting the request
    #[error("Rate limit store error: {0}")]
    Store(#[from] StoreError),
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        AppError::service_unavailable("Rate limiting is temporarily unavailable")
            .with_action("Please try again shortly")
            .with_source(err)
    }
}
