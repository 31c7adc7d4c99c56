//! Webhook ingestion pipeline.
//!
//! Framework-free: takes raw bytes and a signature string, returns an
//! outcome plus the HTTP status it maps to. The HTTP layer adapts requests
//! to this function, so the pipeline never depends on a web framework's
//! request type.
//!
//! Steps run in a fixed order and short-circuit on first failure:
//! secret gate, signature check, payload parse, idempotent insert. The
//! body is never parsed before the signature passes. Every exit path
//! counts its outcome exactly once.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::metrics::Metrics;
use crate::store::{InsertOutcome, MessageStore, NewMessage};
use crate::web::signature::verify_signature;

/// Terminal result of one ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    Duplicate,
    InvalidSignature,
    InvalidPayload,
    StoreError,
}

impl IngestOutcome {
    /// HTTP status this outcome maps to. Duplicate delivery is a success;
    /// callers cannot tell first from nth delivery by status code.
    pub fn http_status(&self) -> u16 {
        match self {
            IngestOutcome::Stored | IngestOutcome::Duplicate => 200,
            IngestOutcome::InvalidSignature => 401,
            IngestOutcome::InvalidPayload => 422,
            IngestOutcome::StoreError => 500,
        }
    }

    /// Label used in metrics and log records.
    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Stored => "stored",
            IngestOutcome::Duplicate => "duplicate",
            IngestOutcome::InvalidSignature => "invalid_signature",
            IngestOutcome::InvalidPayload => "invalid_payload",
            IngestOutcome::StoreError => "store_error",
        }
    }

    /// Status string in the response body. Stored and Duplicate share the
    /// same body; error bodies are fixed strings that never echo the
    /// secret or the provided signature.
    pub fn response_label(&self) -> &'static str {
        match self {
            IngestOutcome::Stored | IngestOutcome::Duplicate => "ok",
            IngestOutcome::InvalidSignature => "unauthorized",
            IngestOutcome::InvalidPayload => "invalid_payload",
            IngestOutcome::StoreError => "error",
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate)
    }
}

/// What one ingestion attempt produced, attached to the response for the
/// request-tracking middleware to log.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub outcome: IngestOutcome,
    pub message_id: Option<String>,
}

/// Inbound webhook payload schema. All fields are required strings;
/// unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub message_id: String,
    #[serde(rename = "from")]
    pub sender: String,
    #[serde(rename = "to")]
    pub recipient: String,
    #[serde(rename = "ts")]
    pub sent_at: String,
    pub text: String,
}

impl WebhookMessage {
    fn into_new_message(self) -> NewMessage {
        NewMessage {
            message_id: self.message_id,
            sender: self.sender,
            recipient: self.recipient,
            sent_at: self.sent_at,
            text: self.text,
        }
    }
}

/// Run the ingestion pipeline over one raw request body.
pub async fn ingest(
    store: &MessageStore,
    metrics: &Metrics,
    secret: Option<&[u8]>,
    raw_body: &[u8],
    signature: Option<&str>,
) -> IngestReport {
    // A missing secret is a deployment fault, not a caller error. Fail
    // closed before looking at the body; readiness reports it separately.
    let Some(secret) = secret else {
        error!("webhook_secret_missing");
        return finish(metrics, IngestOutcome::StoreError, None);
    };

    let verified = signature
        .map(|sig| verify_signature(secret, raw_body, sig))
        .unwrap_or(false);
    if !verified {
        warn!(
            has_signature = signature.is_some(),
            "webhook_signature_invalid"
        );
        return finish(metrics, IngestOutcome::InvalidSignature, None);
    }

    let message: WebhookMessage = match serde_json::from_slice(raw_body) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "webhook_payload_invalid");
            return finish(metrics, IngestOutcome::InvalidPayload, None);
        }
    };
    if message.message_id.is_empty() {
        warn!("webhook_payload_empty_message_id");
        return finish(metrics, IngestOutcome::InvalidPayload, None);
    }

    let message_id = message.message_id.clone();
    match store.insert_if_absent(&message.into_new_message()).await {
        Ok(InsertOutcome::Inserted) => {
            info!(message_id = %message_id, "message_stored");
            finish(metrics, IngestOutcome::Stored, Some(message_id))
        }
        Ok(InsertOutcome::AlreadyExists) => {
            info!(message_id = %message_id, "message_duplicate");
            finish(metrics, IngestOutcome::Duplicate, Some(message_id))
        }
        Err(e) => {
            error!(message_id = %message_id, error = %e, "message_store_failed");
            finish(metrics, IngestOutcome::StoreError, Some(message_id))
        }
    }
}

fn finish(metrics: &Metrics, outcome: IngestOutcome, message_id: Option<String>) -> IngestReport {
    metrics.record_webhook(outcome);
    IngestReport {
        outcome,
        message_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MessageFilter;
    use crate::web::signature::compute_signature;

    const SECRET: &[u8] = b"test-secret";

    fn body(id: &str) -> String {
        format!(
            r#"{{"message_id":"{id}","from":"+15551234567","to":"+15550001111","ts":"2025-01-15T10:00:00Z","text":"Hello"}}"#
        )
    }

    fn setup() -> (MessageStore, Metrics) {
        (MessageStore::open_in_memory().unwrap(), Metrics::default())
    }

    async fn stored_count(store: &MessageStore) -> u64 {
        store
            .list(&MessageFilter {
                limit: 100,
                ..Default::default()
            })
            .await
            .unwrap()
            .total
    }

    #[tokio::test]
    async fn test_stored_then_duplicate() {
        let (store, metrics) = setup();
        let body = body("m1");
        let sig = compute_signature(SECRET, body.as_bytes());

        let report = ingest(&store, &metrics, Some(SECRET), body.as_bytes(), Some(&sig)).await;
        assert_eq!(report.outcome, IngestOutcome::Stored);
        assert_eq!(report.outcome.http_status(), 200);
        assert_eq!(report.message_id.as_deref(), Some("m1"));

        let report = ingest(&store, &metrics, Some(SECRET), body.as_bytes(), Some(&sig)).await;
        assert_eq!(report.outcome, IngestOutcome::Duplicate);
        assert_eq!(report.outcome.http_status(), 200);

        assert_eq!(stored_count(&store).await, 1);
        let text = metrics.render();
        assert!(text.contains("webhook_requests_total{result=\"stored\"} 1"));
        assert!(text.contains("webhook_requests_total{result=\"duplicate\"} 1"));
    }

    #[tokio::test]
    async fn test_invalid_signature_leaves_store_untouched() {
        let (store, metrics) = setup();
        let body = body("m1");
        let sig = compute_signature(SECRET, b"different bytes");

        let report = ingest(&store, &metrics, Some(SECRET), body.as_bytes(), Some(&sig)).await;
        assert_eq!(report.outcome, IngestOutcome::InvalidSignature);
        assert_eq!(report.outcome.http_status(), 401);
        assert_eq!(report.message_id, None);
        assert_eq!(stored_count(&store).await, 0);
        assert!(metrics
            .render()
            .contains("webhook_requests_total{result=\"invalid_signature\"} 1"));
    }

    #[tokio::test]
    async fn test_missing_signature_header() {
        let (store, metrics) = setup();
        let body = body("m1");

        let report = ingest(&store, &metrics, Some(SECRET), body.as_bytes(), None).await;
        assert_eq!(report.outcome, IngestOutcome::InvalidSignature);
        assert_eq!(stored_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_variants() {
        let (store, metrics) = setup();

        for raw in [
            "not json at all",
            r#"{"message_id":"m1","from":"+1"}"#,
            r#"{"message_id":"","from":"+1","to":"+2","ts":"2025-01-15T10:00:00Z","text":"x"}"#,
        ] {
            let sig = compute_signature(SECRET, raw.as_bytes());
            let report = ingest(&store, &metrics, Some(SECRET), raw.as_bytes(), Some(&sig)).await;
            assert_eq!(report.outcome, IngestOutcome::InvalidPayload, "body: {raw}");
            assert_eq!(report.outcome.http_status(), 422);
        }
        assert_eq!(stored_count(&store).await, 0);
        assert!(metrics
            .render()
            .contains("webhook_requests_total{result=\"invalid_payload\"} 3"));
    }

    #[tokio::test]
    async fn test_missing_secret_fails_closed() {
        let (store, metrics) = setup();
        let body = body("m1");
        let sig = compute_signature(SECRET, body.as_bytes());

        let report = ingest(&store, &metrics, None, body.as_bytes(), Some(&sig)).await;
        assert_eq!(report.outcome, IngestOutcome::StoreError);
        assert_eq!(report.outcome.http_status(), 500);
        assert_eq!(stored_count(&store).await, 0);
        assert!(metrics
            .render()
            .contains("webhook_requests_total{result=\"store_error\"} 1"));
    }

    #[tokio::test]
    async fn test_unknown_fields_are_ignored() {
        let (store, metrics) = setup();
        let raw = r#"{"message_id":"m1","from":"+1","to":"+2","ts":"2025-01-15T10:00:00Z","text":"x","extra":42}"#;
        let sig = compute_signature(SECRET, raw.as_bytes());

        let report = ingest(&store, &metrics, Some(SECRET), raw.as_bytes(), Some(&sig)).await;
        assert_eq!(report.outcome, IngestOutcome::Stored);
        assert_eq!(stored_count(&store).await, 1);
    }
}
