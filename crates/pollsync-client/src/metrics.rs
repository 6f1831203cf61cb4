//! Client metrics.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format when enabled.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use pollsync_core::{ErrorKind, UpdateOutcome};
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECT_ATTEMPTS_TOTAL: &str = "pollsync_connect_attempts_total";
    pub const CONNECTED: &str = "pollsync_connected";
    pub const RECONNECTS_TOTAL: &str = "pollsync_reconnects_total";
    pub const TERMINAL_FAILURES_TOTAL: &str = "pollsync_terminal_failures_total";
    pub const FRAMES_TOTAL: &str = "pollsync_frames_total";
    pub const UPDATES_TOTAL: &str = "pollsync_updates_total";
    pub const ERRORS_TOTAL: &str = "pollsync_errors_total";
    pub const ROOMS_ACTIVE: &str = "pollsync_rooms_active";
}

/// Describe all metrics.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECT_ATTEMPTS_TOTAL,
        "Push channel connect attempts, successful or not"
    );
    metrics::describe_gauge!(names::CONNECTED, "1 while the push channel is connected");
    metrics::describe_counter!(
        names::RECONNECTS_TOTAL,
        "Established connections that dropped and were retried"
    );
    metrics::describe_counter!(
        names::TERMINAL_FAILURES_TOTAL,
        "Times the reconnect budget was exhausted"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Push frames sent and received");
    metrics::describe_counter!(names::UPDATES_TOTAL, "Vote updates by outcome");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Classified errors by kind");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Currently joined poll rooms");

    info!("Metrics initialized");
}

/// Start the Prometheus exporter.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

pub fn record_connect_attempt() {
    counter!(names::CONNECT_ATTEMPTS_TOTAL).increment(1);
}

pub fn set_connected(connected: bool) {
    gauge!(names::CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

pub fn record_reconnect() {
    counter!(names::RECONNECTS_TOTAL).increment(1);
}

pub fn record_terminal_failure() {
    counter!(names::TERMINAL_FAILURES_TOTAL).increment(1);
}

/// Record a frame. `direction` is `"in"` or `"out"`.
pub fn record_frame(direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
}

pub fn record_update(outcome: UpdateOutcome) {
    counter!(names::UPDATES_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

pub fn record_error(kind: ErrorKind) {
    let kind = match kind {
        ErrorKind::Connectivity => "connectivity",
        ErrorKind::Domain => "domain",
        ErrorKind::Protocol => "protocol",
    };
    counter!(names::ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        // No recorder installed: every call is a no-op
        init_metrics();
        record_connect_attempt();
        record_update(UpdateOutcome::NoSnapshot);
        record_error(ErrorKind::Domain);
        set_active_rooms(2);
    }
}
