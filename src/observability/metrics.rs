//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_requests_in_flight` (gauge): requests currently being handled
//! - `proxy_requests_cancelled_total` (counter): client went away mid-request
//! - `proxy_rewrites_total` (counter): rewritten bodies by codec
//! - `proxy_overwrite_hits_total` (counter): requests served from the overwrite folder
//!
//! Recording is a no-op until a recorder is installed, so the exporter is
//! optional.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
    ];
    counter!("proxy_requests_total", labels.clone()).increment(1);
    histogram!("proxy_request_duration_seconds", labels).record(start.elapsed().as_secs_f64());
}

pub fn record_in_flight(delta: f64) {
    gauge!("proxy_requests_in_flight").increment(delta);
}

pub fn record_cancelled() {
    counter!("proxy_requests_cancelled_total").increment(1);
}

pub fn record_rewrite(codec: &'static str) {
    counter!("proxy_rewrites_total", "codec" => codec).increment(1);
}

pub fn record_overwrite_hit() {
    counter!("proxy_overwrite_hits_total").increment(1);
}
