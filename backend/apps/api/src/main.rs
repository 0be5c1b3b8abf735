//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but request-level errors are rendered
//! through `kernel::error::AppError`.

mod routes;

use axum::{
    http,
    http::{Method, header},
};
use rate_limit::RateLimiter;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use routes::api_router;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:31113";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,rate_limit=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Rate limiter: shared store when configured, in-memory otherwise
    let limiter = Arc::new(RateLimiter::from_env()?);
    let shared = limiter.store().backend().is_shared();
    tracing::info!(
        shared_store = shared,
        failure_mode = ?limiter.failure_mode(),
        "Rate limiter ready"
    );

    // In-memory counters are never evicted on their own
    if !shared {
        let sweep_secs = match env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS") {
            Ok(raw) => raw.trim().parse::<u64>()?,
            Err(_) => DEFAULT_SWEEP_INTERVAL_SECS,
        };
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs.max(1)));
            loop {
                interval.tick().await;
                let removed = limiter.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed = removed, "Purged expired rate limit counters");
                }
            }
        });
    }

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
        .expose_headers([header::RETRY_AFTER])
        .allow_credentials(true);

    // Build router
    let app = api_router(limiter)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
