//! Codec for live-update events.
//!
//! Browsers consume JSON text frames; constrained observers can ask for
//! MessagePack binary frames instead. Both carry the same event structure.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::frames::LiveEvent;

/// Maximum encoded event size (64 KiB).
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Unknown event format name.
    #[error("Unknown event format: {0}")]
    UnknownFormat(String),
}

/// Encoding used for live events on an observer connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFormat {
    /// UTF-8 JSON, sent as text frames.
    #[default]
    Json,
    /// MessagePack with named fields, sent as binary frames.
    Msgpack,
}

impl EventFormat {
    /// Whether the encoding is text.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, EventFormat::Json)
    }
}

impl FromStr for EventFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(EventFormat::Json),
            "msgpack" => Ok(EventFormat::Msgpack),
            other => Err(ProtocolError::UnknownFormat(other.to_string())),
        }
    }
}

/// Encode an event to bytes.
///
/// # Errors
///
/// Returns an error if the event is too large or encoding fails.
pub fn encode(event: &LiveEvent, format: EventFormat) -> Result<Bytes, ProtocolError> {
    let payload = match format {
        EventFormat::Json => serde_json::to_vec(event)?,
        EventFormat::Msgpack => rmp_serde::to_vec_named(event)?,
    };

    if payload.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode an event from bytes.
///
/// # Errors
///
/// Returns an error if the data is too large or invalid.
pub fn decode(data: &[u8], format: EventFormat) -> Result<LiveEvent, ProtocolError> {
    if data.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(data.len()));
    }

    let event = match format {
        EventFormat::Json => serde_json::from_slice(data)?,
        EventFormat::Msgpack => rmp_serde::from_slice(data)?,
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::ObservationStatus;

    #[test]
    fn test_msgpack_roundtrip() {
        let event = LiveEvent::observation("attic", 31.5, 72.25, ObservationStatus::Bad);
        let encoded = encode(&event, EventFormat::Msgpack).unwrap();
        assert_eq!(decode(&encoded, EventFormat::Msgpack).unwrap(), event);
    }

    #[test]
    fn test_json_is_text() {
        let event = LiveEvent::audio("hall", "doorbell");
        let encoded = encode(&event, EventFormat::Json).unwrap();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.contains("\"event\":\"audio\""));
        assert!(EventFormat::Json.is_text());
        assert!(!EventFormat::Msgpack.is_text());
    }

    #[test]
    fn test_event_too_large() {
        let event = LiveEvent::audio("hall", "x".repeat(MAX_EVENT_SIZE));
        match encode(&event, EventFormat::Json) {
            Err(ProtocolError::EventTooLarge(_)) => {}
            other => panic!("Expected EventTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode(b"not json", EventFormat::Json).is_err());
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("json".parse::<EventFormat>().unwrap(), EventFormat::Json);
        assert_eq!("msgpack".parse::<EventFormat>().unwrap(), EventFormat::Msgpack);
        assert!(matches!(
            "xml".parse::<EventFormat>(),
            Err(ProtocolError::UnknownFormat(_))
        ));
    }
}
