//! Metric helpers for the acquisition pipeline
//!
//! Emitted through the `metrics` facade; without an installed recorder the
//! calls are no-ops.
//!
//! - `mp_http_requests_total` (counter): label `outcome`
//! - `mp_http_retries_total` (counter)
//! - `mp_crawl_pages_total` (counter)
//! - `mp_enrich_items_total` (counter): label `result`

/// Record one request attempt and how it ended.
pub fn record_request(outcome: &'static str) {
    metrics::counter!("mp_http_requests_total", "outcome" => outcome).increment(1);
}

/// Record a backoff-and-retry decision.
pub fn record_retry() {
    metrics::counter!("mp_http_retries_total").increment(1);
}

pub fn record_page() {
    metrics::counter!("mp_crawl_pages_total").increment(1);
}

/// Record an enrichment result (`enriched` or `dropped`).
pub fn record_enrichment(result: &'static str) {
    metrics::counter!("mp_enrich_items_total", "result" => result).increment(1);
}
