//! HTTP endpoint handlers.
//!
//! Handlers adapt HTTP to the core: the webhook handler hands raw bytes
//! and the signature header to the ingestion pipeline, the read handlers
//! translate query parameters into store calls. None of the core logic
//! lives here.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::Config;
use crate::ingest::ingest;
use crate::metrics::Metrics;
use crate::store::{MessageFilter, MessageStore};

const SIGNATURE_HEADER: &str = "X-Signature";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: MessageStore,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config, store: MessageStore, metrics: Metrics) -> Self {
        Self {
            config: Arc::new(config),
            store,
            metrics,
        }
    }
}

/// Minimal status-only response body.
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

// =============================================================================
// Webhook ingestion
// =============================================================================

/// Webhook ingestion endpoint.
///
/// Duplicate deliveries get the byte-identical 200 response as first
/// deliveries; only logs and metrics distinguish them. The report is
/// stashed in the response extensions for the tracking middleware.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let report = ingest(
        &state.store,
        &state.metrics,
        state.config.secret_bytes(),
        &body,
        signature,
    )
    .await;

    let status = StatusCode::from_u16(report.outcome.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (
        status,
        Json(StatusResponse {
            status: report.outcome.response_label(),
        }),
    )
        .into_response();
    response.extensions_mut().insert(report);
    response
}

// =============================================================================
// Message listing
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    pub from: Option<String>,
    pub since: Option<String>,
    pub q: Option<String>,
}

fn default_limit() -> u32 {
    50
}

#[derive(Serialize)]
pub struct ListResponse {
    pub data: Vec<crate::store::Message>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// List stored messages with optional filters and pagination.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    let filter = MessageFilter {
        sender: params.from,
        since: params.since,
        text_contains: params.q,
        limit: params.limit,
        offset: params.offset,
    };

    match state.store.list(&filter).await {
        Ok(page) => (
            StatusCode::OK,
            Json(ListResponse {
                data: page.items,
                total: page.total,
                limit: params.limit,
                offset: params.offset,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "messages_query_failed");
            internal_error()
        }
    }
}

// =============================================================================
// Aggregate stats
// =============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub total_messages: u64,
    pub unique_senders: u64,
    pub messages_per_sender: std::collections::BTreeMap<String, u64>,
    pub first_received_at: Option<i64>,
    pub last_received_at: Option<i64>,
}

/// Aggregate statistics over the full store.
pub async fn stats(State(state): State<AppState>) -> Response {
    match state.store.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(StatsResponse {
                total_messages: stats.total_messages,
                unique_senders: stats.unique_senders,
                messages_per_sender: stats.per_sender_counts,
                first_received_at: stats.first_received_at,
                last_received_at: stats.last_received_at,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "stats_query_failed");
            internal_error()
        }
    }
}

// =============================================================================
// Metrics exposition
// =============================================================================

/// Prometheus text exposition of all counters.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

// =============================================================================
// Health
// =============================================================================

/// Liveness probe: the process is up.
pub async fn health_live() -> Json<StatusResponse> {
    Json(StatusResponse { status: "alive" })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub store_reachable: bool,
    pub secret_configured: bool,
}

/// Readiness probe: the store answers and the shared secret is configured.
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let store_reachable = state.store.ping().await.is_ok();
    let secret_configured = state.config.webhook_secret.is_some();

    let (status, label) = if store_reachable && secret_configured {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    (
        status,
        Json(ReadyResponse {
            status: label,
            store_reachable,
            secret_configured,
        }),
    )
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(StatusResponse { status: "error" }),
    )
        .into_response()
}
