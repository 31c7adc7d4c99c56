//! Per-request tracking middleware.
//!
//! Wraps every route: assigns a correlation id, measures latency, emits
//! exactly one structured log record per request, and bumps the HTTP
//! counter keyed by the matched route template. Logging can never fail
//! the request.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::info;
use uuid::Uuid;

use crate::ingest::IngestReport;
use crate::web::handlers::AppState;

pub async fn track_requests(
    State(state): State<AppState>,
    matched_path: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    // Route template keeps the metric label set bounded; unmatched
    // requests fall back to the raw path.
    let path = matched_path
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;
    state.metrics.record_http(&path, status);

    match response.extensions().get::<IngestReport>() {
        Some(report) => info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status,
            latency_ms,
            result = report.outcome.label(),
            dup = report.outcome.is_duplicate(),
            message_id = report.message_id.as_deref(),
            "request_completed"
        ),
        None => info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status,
            latency_ms,
            "request_completed"
        ),
    }

    response
}
