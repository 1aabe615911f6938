//! # Router Module
//!
//! Assembles the axum router for the inbound surface and the state shared by
//! its handlers.
//!
//! ## Rust Concepts Used
//!
//! - `#[derive(Clone)]` state made of `Arc`s, cloned into every request
//! - axum extractors (`Path`, `Query`, `State`) for typed request parsing
//! - Tower layers (`TraceLayer`) wrapping the whole router

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::caching::{CacheAdmin, ReadThroughCache};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub read_through: Arc<ReadThroughCache>,
    pub admin: Arc<CacheAdmin>,
    /// `None` when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
    /// Host that `/icd/data` URLs must point at
    pub upstream_host: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chapters/:release_id", get(handlers::get_chapters))
        .route("/icd/data", get(handlers::get_node))
        .route("/search/:release_id", get(handlers::search))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/refresh", post(handlers::cache_refresh))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
