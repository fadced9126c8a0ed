//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_rejections_total` (counter): pipeline rejections by stage, code
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limit_buckets` (gauge): live per-caller buckets
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::GatewayError;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), GatewayError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| GatewayError::Metrics(e.to_string()))?;

    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_rejection(stage: &'static str, code: u16) {
    metrics::counter!(
        "gateway_rejections_total",
        "stage" => stage,
        "code" => code.to_string()
    )
    .increment(1);
}

pub fn set_rate_limit_buckets(count: usize) {
    metrics::gauge!("gateway_rate_limit_buckets").set(count as f64);
}
