//! Metrics collection and export for chatline.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "chatline_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "chatline_connections_active";
    pub const MESSAGES_SENT: &str = "chatline_messages_sent_total";
    pub const STATUS_UPDATES: &str = "chatline_status_updates_total";
    pub const MUTATIONS_TOTAL: &str = "chatline_mutations_total";
    pub const EVENTS_PUSHED: &str = "chatline_events_pushed_total";
    pub const REQUEST_LATENCY: &str = "chatline_request_latency_seconds";
    pub const ERRORS_TOTAL: &str = "chatline_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of live connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of live connections"
    );
    metrics::describe_counter!(names::MESSAGES_SENT, "Total number of messages sent");
    metrics::describe_counter!(
        names::STATUS_UPDATES,
        "Total number of messages whose delivery status advanced"
    );
    metrics::describe_counter!(names::MUTATIONS_TOTAL, "Message edits and deletes by kind");
    metrics::describe_counter!(
        names::EVENTS_PUSHED,
        "Total number of events written to live connections"
    );
    metrics::describe_histogram!(
        names::REQUEST_LATENCY,
        "Operation latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors by kind");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new live connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a closed live connection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a sent message.
pub fn record_message_sent() {
    counter!(names::MESSAGES_SENT).increment(1);
}

/// Record messages whose status advanced.
pub fn record_status_updates(count: u64) {
    counter!(names::STATUS_UPDATES).increment(count);
}

/// Record an edit or delete.
pub fn record_mutation(kind: &'static str) {
    counter!(names::MUTATIONS_TOTAL, "kind" => kind).increment(1);
}

/// Record an event written to a live connection.
pub fn record_event_pushed(kind: &'static str) {
    counter!(names::EVENTS_PUSHED, "kind" => kind).increment(1);
}

/// Record operation latency.
pub fn record_latency(operation: &'static str, seconds: f64) {
    histogram!(names::REQUEST_LATENCY, "operation" => operation).record(seconds);
}

/// Record an error.
pub fn record_error(kind: &'static str) {
    counter!(names::ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter() {
        let _guard = ConnectionMetricsGuard::new();
        record_message_sent();
        record_mutation("edit");
        record_latency("send", 0.001);
        record_error("not_found");
    }
}
