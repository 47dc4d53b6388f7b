//! Metrics collection and exposition.
//!
//! # Metrics
//! - `replica_node_health` (gauge): 1=healthy, 0=unhealthy
//! - `replica_node_weight` (gauge): current selection weight
//! - `replica_probe_latency_seconds` (histogram): probe round-trip
//! - `replica_degraded_reads_total` (counter): reads served by the primary
//! - `replica_leases_total` (counter): leases by node and role
//! - `replica_pool_exhausted_total` (counter): acquisitions that gave up
//! - `replica_consistency_observations_total` (counter): by node, consistent
//! - `replica_lag_seconds` (histogram): matched replication lag samples
//! - `replica_capacity_batch_successes` (gauge): successes per batch size
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_node_health(node: &str, healthy: bool, weight: f64) {
    gauge!("replica_node_health", "node" => node.to_string()).set(if healthy { 1.0 } else { 0.0 });
    gauge!("replica_node_weight", "node" => node.to_string()).set(weight);
}

pub fn record_probe_latency(node: &str, latency: Duration) {
    histogram!("replica_probe_latency_seconds", "node" => node.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_degraded_read() {
    counter!("replica_degraded_reads_total").increment(1);
}

pub fn record_lease(node: &str, role: &'static str) {
    counter!("replica_leases_total", "node" => node.to_string(), "role" => role).increment(1);
}

pub fn record_pool_exhausted(node: &str) {
    counter!("replica_pool_exhausted_total", "node" => node.to_string()).increment(1);
}

pub fn record_consistency_observation(node: &str, consistent: bool) {
    counter!(
        "replica_consistency_observations_total",
        "node" => node.to_string(),
        "consistent" => if consistent { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_replication_lag(node: &str, lag: Duration) {
    histogram!("replica_lag_seconds", "node" => node.to_string()).record(lag.as_secs_f64());
}

pub fn record_capacity_batch(batch_size: usize, successes: usize) {
    gauge!("replica_capacity_batch_successes", "batch_size" => batch_size.to_string())
        .set(successes as f64);
}
