//! Prometheus metrics for doppel.
//!
//! Process-wide and write-only: the engine records into them but never reads them.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::time::Duration;
use tracing::warn;

lazy_static! {
    /// Exchanges handled, by mode
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "doppel_requests_total",
        "Total number of exchanges handled by the engine",
        &["mode"]  // mode: capture|simulate|modify|synthesize|passthrough
    )
    .unwrap();

    /// Template matching outcomes
    pub static ref MATCH_OUTCOMES_TOTAL: CounterVec = register_counter_vec!(
        "doppel_match_outcomes_total",
        "Outcome of template matching",
        &["outcome"]  // outcome: matched|unmatched
    )
    .unwrap();

    /// Cache lookups
    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = register_counter_vec!(
        "doppel_cache_lookups_total",
        "Request cache lookups",
        &["result"]  // result: hit|miss
    )
    .unwrap();

    /// Middleware executions
    pub static ref MIDDLEWARE_EXECUTIONS_TOTAL: CounterVec = register_counter_vec!(
        "doppel_middleware_executions_total",
        "Middleware executions by outcome",
        &["outcome"]  // outcome: ok|<error kind>
    )
    .unwrap();

    /// Upstream forwarding failures
    pub static ref UPSTREAM_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "doppel_upstream_failures_total",
        "Requests the upstream could not answer",
        &["mode"]
    )
    .unwrap();

    /// Injected delay
    pub static ref DELAY_INJECTED_MS: HistogramVec = register_histogram_vec!(
        "doppel_delay_injected_ms",
        "Histogram of injected response delay in milliseconds",
        &["source"],  // source: rule|fixed
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(mode: &str) {
    REQUESTS_TOTAL.with_label_values(&[mode]).inc();
}

pub fn record_match(matched: bool) {
    let outcome = if matched { "matched" } else { "unmatched" };
    MATCH_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS_TOTAL.with_label_values(&[result]).inc();
}

/// `outcome` is "ok" or a `MiddlewareError::kind`
pub fn record_middleware(outcome: &str) {
    MIDDLEWARE_EXECUTIONS_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

pub fn record_upstream_failure(mode: &str) {
    UPSTREAM_FAILURES_TOTAL.with_label_values(&[mode]).inc();
}

pub fn record_delay(source: &str, delay: Duration) {
    DELAY_INJECTED_MS
        .with_label_values(&[source])
        .observe(delay.as_millis() as f64);
}
