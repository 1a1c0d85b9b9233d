//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connections closed because their outbound queue was full (counter).
pub const WS_QUEUE_OVERFLOWS_TOTAL: &str = "ws_queue_overflows_total";
/// Connections closed because the same identity reconnected (counter).
pub const WS_SUPERSEDED_TOTAL: &str = "ws_superseded_total";
/// Upgrade attempts rejected before the handshake (counter, labels: reason).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Presence snapshots broadcast (counter).
pub const PRESENCE_BROADCASTS_TOTAL: &str = "presence_broadcasts_total";
/// Inbound commands accepted for processing (counter, labels: command).
pub const COMMANDS_TOTAL: &str = "commands_total";
/// Inbound frames answered with an error (counter, labels: category).
pub const COMMAND_ERRORS_TOTAL: &str = "command_errors_total";
/// Bus payloads received (counter).
pub const BUS_EVENTS_TOTAL: &str = "bus_events_total";
/// Bus payloads that failed to decode (counter).
pub const BUS_EVENTS_MALFORMED_TOTAL: &str = "bus_events_malformed_total";
/// Frames queued to local connections from the bus (counter).
pub const BUS_EVENTS_DELIVERED_TOTAL: &str = "bus_events_delivered_total";
