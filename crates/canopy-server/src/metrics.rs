//! Metrics export for Canopy.
//!
//! The core records through the `metrics` facade; this module describes
//! those metrics and installs the Prometheus exporter.

use canopy_core::metrics::names;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Describe every metric the bridge records.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::MESSAGES_TOTAL,
        "Inbound bus messages by handling outcome"
    );
    metrics::describe_counter!(names::READINGS_TOTAL, "Decoded numeric readings");
    metrics::describe_counter!(names::PAIRS_TOTAL, "Classified observations by status");
    metrics::describe_counter!(names::ALERTS_TOTAL, "Alerts published to the bus");
    metrics::describe_counter!(names::SINK_ERRORS_TOTAL, "Failed sink deliveries by sink");
    metrics::describe_counter!(
        names::SINK_DROPPED_TOTAL,
        "Effects dropped because a sink queue was full"
    );
    metrics::describe_counter!(names::BUS_RECONNECTS_TOTAL, "Bus reconnection attempts");
    metrics::describe_histogram!(
        names::CLASSIFY_SECONDS,
        "Decision function latency in seconds"
    );
    metrics::describe_gauge!(names::OBSERVERS_ACTIVE, "Connected live-update observers");
    metrics::describe_gauge!(
        names::PENDING_LOCATIONS,
        "Locations with partial readings waiting for a counterpart"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!(%addr, "Metrics server listening");
    Ok(())
}
