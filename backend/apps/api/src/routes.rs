//! API Router
//!
//! The rate-limited endpoints of the tutoring app, grouped by policy. The
//! features behind them (document parsing, the chat relay, speech synthesis)
//! are served elsewhere; these handlers only acknowledge the request once it
//! has cleared its quota.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use rate_limit::middleware::{RateLimitLayerState, limit, limit_with};
use rate_limit::{API_LIMIT, AUTH_LIMIT, CHAT_LIMIT, RateLimiter, TTS_LIMIT, UPLOAD_LIMIT};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
}

async fn accepted() -> Json<Ack> {
    Json(Ack { status: "accepted" })
}

async fn healthz() -> &'static str {
    "ok"
}

/// Build the application router around a shared limiter.
pub fn api_router(limiter: Arc<RateLimiter>) -> Router {
    let chat = limit(
        Router::new().route("/chat", post(accepted)),
        limiter.clone(),
        &CHAT_LIMIT,
    );
    let upload = limit_with(
        Router::new().route("/upload", post(accepted)),
        RateLimitLayerState::new(limiter.clone(), &UPLOAD_LIMIT)
            .with_message("Too many uploads. Please try again later."),
    );
    let tts = limit_with(
        Router::new().route("/tts", post(accepted)),
        RateLimitLayerState::new(limiter.clone(), &TTS_LIMIT)
            .with_message("Too many TTS requests, please slow down."),
    );
    let auth = limit_with(
        Router::new().route("/auth/init", post(accepted)),
        RateLimitLayerState::new(limiter.clone(), &AUTH_LIMIT)
            .with_message("Too many requests. Please try again later."),
    );
    let general = limit(
        Router::new()
            .route("/notes/generate", post(accepted))
            .route("/exercises/generate", post(accepted))
            .route("/exercises/feedback", post(accepted)),
        limiter,
        &API_LIMIT,
    );

    Router::new()
        .nest(
            "/api",
            chat.merge(upload).merge(tts).merge(auth).merge(general),
        )
        .route("/healthz", get(healthz))
}
