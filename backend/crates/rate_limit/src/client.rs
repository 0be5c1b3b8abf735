//! Client identification utilities
//!
//! Derives the identifier requests are bucketed under from HTTP headers.
//!
//! ## Limitations
//! `X-Forwarded-For` and `X-Real-IP` are set by the client unless a trusted
//! proxy overwrites them. Without such a proxy a client can pick its own
//! bucket, so these identifiers are only fit for rate limiting, never for
//! authentication.

use axum::http::HeaderMap;

use crate::limiter::UNKNOWN_IDENTIFIER;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Authenticated user id, inserted as a request extension by whatever layer
/// authenticated the request. Takes precedence over the client IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Best-effort client address from request headers.
///
/// Checks, in order:
/// 1. the first comma-separated entry of `X-Forwarded-For` (trimmed)
/// 2. `X-Real-IP`
/// 3. the literal `"unknown"`
///
/// The value is not validated as an IP address.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty());

    let real_ip = || {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_IDENTIFIER)
        .to_string()
}

/// Identifier for a request: the user id when authenticated, else the client address.
pub fn identifier_for(user_id: Option<&str>, headers: &HeaderMap) -> String {
    match user_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => client_identifier(headers),
    }
}
