//! # canopy-protocol
//!
//! Wire formats shared by the Canopy telemetry bridge and its collaborators.
//!
//! This crate defines everything that crosses a process boundary:
//!
//! - **Topics** - the `<namespace>/<location>/<measurement>` naming contract
//! - **Live events** - named events broadcast to connected observers
//! - **Codec** - JSON and MessagePack encodings for live events
//! - **Line protocol** - time-series points in InfluxDB line format
//!
//! ## Example
//!
//! ```rust
//! use canopy_protocol::{codec, EventFormat, LiveEvent, ObservationStatus};
//!
//! let event = LiveEvent::observation("kitchen", 22.0, 40.0, ObservationStatus::Good);
//!
//! let encoded = codec::encode(&event, EventFormat::Json).unwrap();
//! let decoded = codec::decode(&encoded, EventFormat::Json).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod line;
pub mod topic;

pub use codec::{decode, encode, EventFormat, ProtocolError};
pub use frames::{LiveEvent, ObservationStatus, SCHEMA_VERSION};
pub use line::Point;
pub use topic::{alert_topic, subscription_filter, DEFAULT_NAMESPACE};
