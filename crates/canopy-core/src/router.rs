//! Topic router.
//!
//! Splits a raw bus topic into its origin location and measurement kind.
//! Routing is pure: the same topic always yields the same [`ParsedTopic`].

use canopy_protocol::topic::{self, SEPARATOR};
use canopy_protocol::DEFAULT_NAMESPACE;
use tracing::trace;

/// Intent of a message, derived from its measurement segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicKind {
    /// A telemetry reading; the measurement name is passed through verbatim.
    Telemetry(String),
    /// Device status message.
    Status,
    /// Device command message.
    Command,
    /// Audio/event token.
    Audio,
    /// Topic does not match `<namespace>/<location>/<measurement>`.
    Malformed,
}

/// A routed topic.
///
/// `location` is empty when `kind` is [`TopicKind::Malformed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedTopic {
    /// Origin location.
    pub location: String,
    /// Message intent.
    pub kind: TopicKind,
}

impl ParsedTopic {
    /// A topic that did not match the pattern.
    #[must_use]
    pub fn malformed() -> Self {
        Self {
            location: String::new(),
            kind: TopicKind::Malformed,
        }
    }

    /// Check if the topic is malformed.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.kind == TopicKind::Malformed
    }
}

/// Routes topics under a fixed namespace.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    namespace: String,
}

impl TopicRouter {
    /// Create a router for the default namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Create a router for a custom namespace.
    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Get the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Route a topic.
    ///
    /// Exactly three non-empty segments are required, the first being the
    /// namespace. Anything else is [`TopicKind::Malformed`].
    #[must_use]
    pub fn route(&self, topic: &str) -> ParsedTopic {
        let mut segments = topic.split(SEPARATOR);

        let (Some(namespace), Some(location), Some(measurement), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            trace!(topic = %topic, "Topic has wrong segment count");
            return ParsedTopic::malformed();
        };

        if namespace != self.namespace || location.is_empty() || measurement.is_empty() {
            trace!(topic = %topic, "Topic outside namespace or has empty segment");
            return ParsedTopic::malformed();
        }

        let kind = match measurement {
            topic::STATUS => TopicKind::Status,
            topic::COMMAND => TopicKind::Command,
            topic::AUDIO => TopicKind::Audio,
            name => TopicKind::Telemetry(name.to_string()),
        };

        ParsedTopic {
            location: location.to_string(),
            kind,
        }
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_reserved() {
        let router = TopicRouter::new();

        let status = router.route("home/kitchen/status");
        assert_eq!(status.kind, TopicKind::Status);
        assert_eq!(status.location, "kitchen");

        assert_eq!(router.route("home/kitchen/command").kind, TopicKind::Command);
        assert_eq!(router.route("home/hall/audio").kind, TopicKind::Audio);
    }

    #[test]
    fn test_route_telemetry() {
        let router = TopicRouter::new();

        let parsed = router.route("home/kitchen/temperature");
        assert_eq!(parsed.location, "kitchen");
        assert_eq!(parsed.kind, TopicKind::Telemetry("temperature".to_string()));

        // Arbitrary names pass through unvalidated
        let parsed = router.route("home/garage/battery");
        assert_eq!(parsed.kind, TopicKind::Telemetry("battery".to_string()));
    }

    #[test]
    fn test_route_malformed() {
        let router = TopicRouter::new();

        assert!(router.route("bogus").is_malformed());
        assert!(router.route("").is_malformed());
        assert!(router.route("home/response").is_malformed());
        assert!(router.route("home/kitchen/temperature/extra").is_malformed());
        assert!(router.route("home//temperature").is_malformed());
        assert!(router.route("home/kitchen/").is_malformed());
        assert!(router.route("office/kitchen/temperature").is_malformed());
    }

    #[test]
    fn test_route_custom_namespace() {
        let router = TopicRouter::with_namespace("lab");
        assert_eq!(router.namespace(), "lab");
        assert_eq!(
            router.route("lab/bench/humidity").kind,
            TopicKind::Telemetry("humidity".to_string())
        );
        assert!(router.route("home/bench/humidity").is_malformed());
    }
}
