//! Payload decoding.
//!
//! Turns a routed topic plus raw payload into a typed value. Decoding never
//! fails loudly: anything that cannot be used is returned as
//! [`Decoded::Rejected`] with the reason, and the caller drops it.

use crate::observation::{AudioEvent, Reading};
use crate::router::{ParsedTopic, TopicKind};
use std::fmt;

/// Why a message was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Topic did not match the naming pattern.
    MalformedTopic,
    /// Status or command message; carries no telemetry.
    Control,
    /// Telemetry payload is not a finite float literal.
    InvalidPayload(String),
}

impl RejectReason {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::MalformedTopic => "malformed_topic",
            RejectReason::Control => "control",
            RejectReason::InvalidPayload(_) => "invalid_payload",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MalformedTopic => f.write_str("malformed topic"),
            RejectReason::Control => f.write_str("control message"),
            RejectReason::InvalidPayload(detail) => write!(f, "invalid payload: {detail}"),
        }
    }
}

/// Result of decoding one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A telemetry reading.
    Reading(Reading),
    /// An audio/event token.
    Audio(AudioEvent),
    /// Nothing usable.
    Rejected(RejectReason),
}

/// Decode a payload according to its routed topic.
#[must_use]
pub fn decode(topic: &ParsedTopic, payload: &[u8]) -> Decoded {
    match &topic.kind {
        TopicKind::Telemetry(measurement) => match parse_value(payload) {
            Ok(value) => Decoded::Reading(Reading::new(&topic.location, measurement, value)),
            Err(detail) => Decoded::Rejected(RejectReason::InvalidPayload(detail)),
        },
        TopicKind::Audio => Decoded::Audio(AudioEvent::new(
            &topic.location,
            String::from_utf8_lossy(payload),
        )),
        TopicKind::Status | TopicKind::Command => Decoded::Rejected(RejectReason::Control),
        TopicKind::Malformed => Decoded::Rejected(RejectReason::MalformedTopic),
    }
}

fn parse_value(payload: &[u8]) -> Result<f64, String> {
    let text = std::str::from_utf8(payload).map_err(|e| e.to_string())?;
    let trimmed = text.trim();

    let value: f64 = trimmed
        .parse()
        .map_err(|_| format!("not a number: {trimmed:?}"))?;

    if !value.is_finite() {
        return Err(format!("not finite: {trimmed:?}"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::TopicRouter;

    fn topic(raw: &str) -> ParsedTopic {
        TopicRouter::new().route(raw)
    }

    #[test]
    fn test_decode_reading() {
        let decoded = decode(&topic("home/kitchen/humidity"), b"44.0");
        assert_eq!(
            decoded,
            Decoded::Reading(Reading::new("kitchen", "humidity", 44.0))
        );
    }

    #[test]
    fn test_decode_trims_whitespace() {
        let decoded = decode(&topic("home/kitchen/temperature"), b" 21.5\n");
        assert_eq!(
            decoded,
            Decoded::Reading(Reading::new("kitchen", "temperature", 21.5))
        );
    }

    #[test]
    fn test_decode_invalid_payload() {
        let t = topic("home/kitchen/humidity");
        let payloads: [&[u8]; 5] = [b"not-a-number", b"", b"NaN", b"inf", &[0xff, 0xfe]];
        for payload in payloads {
            match decode(&t, payload) {
                Decoded::Rejected(RejectReason::InvalidPayload(_)) => {}
                other => panic!("Expected InvalidPayload for {payload:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_audio_passthrough() {
        let decoded = decode(&topic("home/hall/audio"), b"glass-break 0.93");
        assert_eq!(
            decoded,
            Decoded::Audio(AudioEvent::new("hall", "glass-break 0.93"))
        );
    }

    #[test]
    fn test_decode_control_and_malformed() {
        assert_eq!(
            decode(&topic("home/kitchen/status"), b"online"),
            Decoded::Rejected(RejectReason::Control)
        );
        assert_eq!(
            decode(&topic("home/kitchen/command"), b"reboot"),
            Decoded::Rejected(RejectReason::Control)
        );
        assert_eq!(
            decode(&topic("bogus"), b"1.0"),
            Decoded::Rejected(RejectReason::MalformedTopic)
        );
    }
}
