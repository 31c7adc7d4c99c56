//! MsgSink - signed webhook message ingestion service.
//!
//! Ingests HMAC-signed webhook events, persists each message exactly once
//! keyed by `message_id`, and exposes read APIs for listing and aggregate
//! statistics.
//!
//! ## Architecture
//!
//! ```text
//! POST /webhook → signature check → payload parse → insert-if-absent → SQLite
//! GET /messages, /stats → filtered reads over the same store
//! GET /metrics → counter exposition
//! ```
//!
//! The ingestion pipeline (`ingest`) is framework-free; the `web` module
//! adapts HTTP to it.

pub mod config;
pub mod ingest;
pub mod metrics;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use ingest::{ingest, IngestOutcome, IngestReport};
pub use metrics::Metrics;
pub use store::{InsertOutcome, MessageFilter, MessageStore, StoreError};
pub use web::{build_router, AppState};
