//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status
//! - `proxy_request_duration_seconds` (histogram): upstream latency by method
//! - `auth_header_requests_total` (counter): requests by middleware, outcome
//! - `auth_header_spoofed_headers_total` (counter): client-supplied X-Auth-* headers removed

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::auth_header::Outcome;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one forwarded request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record what the signing middleware did with one request.
pub fn record_auth_outcome(middleware: &str, outcome: &Outcome) {
    counter!(
        "auth_header_requests_total",
        "middleware" => middleware.to_string(),
        "outcome" => outcome.label()
    )
    .increment(1);

    if outcome.spoofed > 0 {
        counter!("auth_header_spoofed_headers_total", "middleware" => middleware.to_string())
            .increment(outcome.spoofed as u64);
    }
}
