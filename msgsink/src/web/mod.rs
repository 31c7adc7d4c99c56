//! HTTP surface: router, handlers, signature verification, and the
//! per-request tracking middleware.
//!
//! Everything here is adaptation between HTTP and the core modules; the
//! ingestion pipeline itself never sees framework types.

pub mod handlers;
pub mod middleware;
pub mod signature;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::AppState;

/// Build the complete router with all routes and layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(handlers::webhook))
        .route("/messages", get(handlers::list_messages))
        .route("/stats", get(handlers::stats))
        .route("/metrics", get(handlers::metrics))
        .route("/health/live", get(handlers::health_live))
        .route("/health/ready", get(handlers::health_ready))
        .layer(from_fn_with_state(state.clone(), middleware::track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
