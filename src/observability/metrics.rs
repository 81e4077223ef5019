//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fetch_attempts_total` (counter): every attempt by outcome kind
//! - `fetch_results_total` (counter): terminal results, success or failure
//! - `fetch_duration_seconds` (histogram): per-target wall-clock time
//! - `rate_limiter_wait_seconds` (histogram): time spent waiting for a token
//! - `circuit_breaker_transitions_total` (counter): state changes by target state
//! - `circuit_breaker_rejections_total` (counter): fail-fast rejections
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::fetch::FetchResult;
use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a single attempt made by a worker.
pub fn record_attempt(result: &FetchResult) {
    let kind = result.error_kind.map(|k| k.as_str()).unwrap_or("ok");
    counter!("fetch_attempts_total", "kind" => kind).increment(1);
}

/// Record the terminal result for one target.
pub fn record_result(result: &FetchResult) {
    let outcome = if result.is_success() { "success" } else { "failure" };
    counter!("fetch_results_total", "outcome" => outcome).increment(1);
    histogram!("fetch_duration_seconds").record(result.elapsed.as_secs_f64());
}

pub fn record_rate_limit_wait(waited: Duration) {
    histogram!("rate_limiter_wait_seconds").record(waited.as_secs_f64());
}

pub fn record_breaker_transition(to: CircuitState) {
    counter!("circuit_breaker_transitions_total", "to" => to.as_str()).increment(1);
}

pub fn record_breaker_rejection() {
    counter!("circuit_breaker_rejections_total").increment(1);
}
