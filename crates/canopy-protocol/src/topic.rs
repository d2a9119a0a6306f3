//! Topic naming contract.
//!
//! Sensors publish on `<namespace>/<location>/<measurement>`. The bridge
//! subscribes to the single wildcard filter covering every location and
//! measurement, and answers on a fixed two-segment alert topic.

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "home";

/// Topic segment separator.
pub const SEPARATOR: char = '/';

/// Reserved measurement carrying device status.
pub const STATUS: &str = "status";

/// Reserved measurement carrying device commands.
pub const COMMAND: &str = "command";

/// Reserved measurement carrying audio/event tokens.
pub const AUDIO: &str = "audio";

/// Measurement names that pair into one observation.
pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";

/// Suffix of the alert topic under the namespace.
const ALERT_SUFFIX: &str = "response";

/// Wildcard subscription filter for a namespace (`<namespace>/+/+`).
#[must_use]
pub fn subscription_filter(namespace: &str) -> String {
    format!("{namespace}{SEPARATOR}+{SEPARATOR}+")
}

/// Default alert topic for a namespace (`<namespace>/response`).
///
/// The alert topic has two segments, so alerts echoed back by the broker
/// never match the telemetry pattern.
#[must_use]
pub fn alert_topic(namespace: &str) -> String {
    format!("{namespace}{SEPARATOR}{ALERT_SUFFIX}")
}

/// Human-readable alert text for a location classified as bad.
#[must_use]
pub fn alert_message(location: &str) -> String {
    format!("Alert: Temperature and humidity in {location} are bad")
}

/// Check whether a measurement name is reserved (never telemetry).
#[must_use]
pub fn is_reserved(measurement: &str) -> bool {
    matches!(measurement, STATUS | COMMAND | AUDIO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_filter() {
        assert_eq!(subscription_filter("home"), "home/+/+");
        assert_eq!(subscription_filter("lab"), "lab/+/+");
    }

    #[test]
    fn test_alert_topic_is_not_telemetry_shaped() {
        let topic = alert_topic(DEFAULT_NAMESPACE);
        assert_eq!(topic, "home/response");
        assert_eq!(topic.split(SEPARATOR).count(), 2);
    }

    #[test]
    fn test_alert_message_names_location() {
        assert_eq!(
            alert_message("kitchen"),
            "Alert: Temperature and humidity in kitchen are bad"
        );
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("status"));
        assert!(is_reserved("command"));
        assert!(is_reserved("audio"));
        assert!(!is_reserved("temperature"));
        assert!(!is_reserved("battery"));
    }
}
