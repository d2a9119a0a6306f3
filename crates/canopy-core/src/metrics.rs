//! Metric names and recording helpers.
//!
//! Recorded through the `metrics` facade; the server installs the exporter.

use metrics::{counter, gauge, histogram};

/// Metric names.
pub mod names {
    pub const MESSAGES_TOTAL: &str = "canopy_messages_total";
    pub const READINGS_TOTAL: &str = "canopy_readings_total";
    pub const PAIRS_TOTAL: &str = "canopy_pairs_total";
    pub const ALERTS_TOTAL: &str = "canopy_alerts_total";
    pub const SINK_ERRORS_TOTAL: &str = "canopy_sink_errors_total";
    pub const SINK_DROPPED_TOTAL: &str = "canopy_sink_dropped_total";
    pub const BUS_RECONNECTS_TOTAL: &str = "canopy_bus_reconnects_total";
    pub const CLASSIFY_SECONDS: &str = "canopy_classify_seconds";
    pub const OBSERVERS_ACTIVE: &str = "canopy_observers_active";
    pub const PENDING_LOCATIONS: &str = "canopy_pending_locations";
}

/// Record an inbound message and how it was handled.
pub fn record_message(outcome: &'static str) {
    counter!(names::MESSAGES_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a decoded reading.
pub fn record_reading() {
    counter!(names::READINGS_TOTAL).increment(1);
}

/// Record a completed pair and its status.
pub fn record_pair(status: &'static str) {
    counter!(names::PAIRS_TOTAL, "status" => status).increment(1);
}

/// Record a published alert.
pub fn record_alert() {
    counter!(names::ALERTS_TOTAL).increment(1);
}

/// Record a sink failure.
pub fn record_sink_error(sink: &'static str) {
    counter!(names::SINK_ERRORS_TOTAL, "sink" => sink).increment(1);
}

/// Record an effect dropped because its sink queue was full or closed.
pub fn record_sink_dropped(sink: &'static str) {
    counter!(names::SINK_DROPPED_TOTAL, "sink" => sink).increment(1);
}

/// Record a bus reconnect attempt.
pub fn record_reconnect() {
    counter!(names::BUS_RECONNECTS_TOTAL).increment(1);
}

/// Record classification latency.
pub fn record_classify_latency(seconds: f64) {
    histogram!(names::CLASSIFY_SECONDS).record(seconds);
}

/// Update the connected observer count.
pub fn set_observers(count: usize) {
    gauge!(names::OBSERVERS_ACTIVE).set(count as f64);
}

/// Update the number of locations with pending readings.
pub fn set_pending_locations(count: usize) {
    gauge!(names::PENDING_LOCATIONS).set(count as f64);
}
