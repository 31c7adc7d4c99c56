//! Process-wide request counters with Prometheus text exposition.
//!
//! The registry is constructed once at startup and passed into the router
//! state; there is no module-level global. Counters only grow and reset on
//! process restart.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::ingest::IngestOutcome;

/// Cloneable counter registry shared by all in-flight requests.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    /// `(route, status)` pairs; route labels come from the matched route
    /// template, so the key set stays bounded for routed traffic.
    http: Mutex<BTreeMap<(String, u16), u64>>,
    stored: AtomicU64,
    duplicate: AtomicU64,
    invalid_signature: AtomicU64,
    invalid_payload: AtomicU64,
    store_error: AtomicU64,
}

impl Metrics {
    /// Count one completed HTTP request for a `(route, status)` pair.
    pub fn record_http(&self, path: &str, status: u16) {
        let mut http = self
            .inner
            .http
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *http.entry((path.to_string(), status)).or_insert(0) += 1;
    }

    /// Count one webhook ingestion outcome.
    pub fn record_webhook(&self, outcome: IngestOutcome) {
        let counter = match outcome {
            IngestOutcome::Stored => &self.inner.stored,
            IngestOutcome::Duplicate => &self.inner.duplicate,
            IngestOutcome::InvalidSignature => &self.inner.invalid_signature,
            IngestOutcome::InvalidPayload => &self.inner.invalid_payload,
            IngestOutcome::StoreError => &self.inner.store_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Render all counters in the Prometheus text format.
    ///
    /// The five webhook outcome series always appear, even at zero. HTTP
    /// series appear as `(route, status)` pairs are first observed and
    /// never disappear, so the exposition is append-stable.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# TYPE http_requests_total counter\n");
        {
            let http = self
                .inner
                .http
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for ((path, status), count) in http.iter() {
                out.push_str(&format!(
                    "http_requests_total{{path=\"{path}\",status=\"{status}\"}} {count}\n"
                ));
            }
        }

        out.push_str("# TYPE webhook_requests_total counter\n");
        let outcomes = [
            ("stored", &self.inner.stored),
            ("duplicate", &self.inner.duplicate),
            ("invalid_signature", &self.inner.invalid_signature),
            ("invalid_payload", &self.inner.invalid_payload),
            ("store_error", &self.inner.store_error),
        ];
        for (label, counter) in outcomes {
            let count = counter.load(Ordering::Relaxed);
            out.push_str(&format!(
                "webhook_requests_total{{result=\"{label}\"}} {count}\n"
            ));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_counter_accumulates() {
        let metrics = Metrics::default();
        metrics.record_http("/webhook", 200);
        metrics.record_http("/webhook", 200);
        metrics.record_http("/webhook", 401);

        let text = metrics.render();
        assert!(text.contains("http_requests_total{path=\"/webhook\",status=\"200\"} 2"));
        assert!(text.contains("http_requests_total{path=\"/webhook\",status=\"401\"} 1"));
    }

    #[test]
    fn test_webhook_outcome_lines_always_render() {
        let metrics = Metrics::default();
        let text = metrics.render();
        for label in [
            "stored",
            "duplicate",
            "invalid_signature",
            "invalid_payload",
            "store_error",
        ] {
            assert!(
                text.contains(&format!("webhook_requests_total{{result=\"{label}\"}} 0")),
                "missing zero-valued line for {label}"
            );
        }
    }

    #[test]
    fn test_webhook_counter_increments() {
        let metrics = Metrics::default();
        metrics.record_webhook(IngestOutcome::Stored);
        metrics.record_webhook(IngestOutcome::Duplicate);
        metrics.record_webhook(IngestOutcome::Duplicate);

        let text = metrics.render();
        assert!(text.contains("webhook_requests_total{result=\"stored\"} 1"));
        assert!(text.contains("webhook_requests_total{result=\"duplicate\"} 2"));
    }

    #[test]
    fn test_type_headers_present() {
        let text = Metrics::default().render();
        assert!(text.contains("# TYPE http_requests_total counter"));
        assert!(text.contains("# TYPE webhook_requests_total counter"));
    }
}
