//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (exchanges, latency, pool dials)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_exchanges_total` (counter): exchanges by protocol, status, outcome
//! - `gateway_exchange_duration_seconds` (histogram): latency by protocol
//! - `gateway_grpc_pool_dials_total` (counter): new pooled gRPC channels dialed
//!
//! # Design Decisions
//! - `outcome` follows the success-status set of the status mapping
//! - Recording without an installed exporter is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_exchange(protocol: &str, status: u16, success: bool, start: Instant) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "gateway_exchanges_total",
        "protocol" => protocol.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        "gateway_exchange_duration_seconds",
        "protocol" => protocol.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_pool_dial() {
    metrics::counter!("gateway_grpc_pool_dials_total").increment(1);
}
