//! Shared observability utilities for the demo services.
//!
//! Covers the three concerns every service carries: a tracing subscriber
//! with environment-driven filtering, a health/info surface, and a small
//! Prometheus text-format metrics facade.

mod metrics;

pub use metrics::{
    auth_attempts_total, encode_prometheus, handler_latency_seconds, http_requests_total,
    register_counter, register_histogram, upstream_requests_total, Counter, CounterVec, Histogram,
    HistogramVec, PROMETHEUS_CONTENT_TYPE,
};

use std::io;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum ObsInitError {
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}

/// Initialize observability for a service.
pub struct ObsInit;

impl ObsInit {
    /// Install the global tracing subscriber and register the service with
    /// the metrics registry.
    ///
    /// Filtering comes from `RUST_LOG`, then `LOG_LEVEL`, then `info`.
    pub fn init(service: &str) -> Result<(), ObsInitError> {
        metrics::init(service);

        let env_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(env_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(io::stderr)
            .try_init()
            .map_err(|_| ObsInitError::AlreadyInitialized)
    }
}

/// Build the health and info router every service merges in.
pub fn health_router(service: &'static str) -> Router {
    let version = env!("CARGO_PKG_VERSION");
    Router::new()
        .route(
            "/health",
            get(move || async move { Json(json!({ "status": "ok", "service": service })) }),
        )
        .route(
            "/info",
            get(move || async move { Json(json!({ "service": service, "version": version })) }),
        )
}
