//! # canopy-core
//!
//! The telemetry bridge pipeline for Canopy.
//!
//! This crate provides the stages every inbound bus message passes through:
//!
//! - **Router** - Parse `<namespace>/<location>/<measurement>` topics
//! - **Reading** - Decode payloads into typed readings or audio tokens
//! - **Correlation** - Pair temperature and humidity per location
//! - **Classifier** - Score paired observations with a decision function
//! - **Fan-out** - Deliver to storage, alerting and observers independently
//! - **Controller** - Bus connection lifecycle with reconnect backoff
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Controller  │────▶│   Router    │────▶│ Correlation │────▶│ Classifier  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                                       │
//!                            ▼                                       ▼
//!                     ┌─────────────┐                         ┌─────────────┐
//!                     │   Fan-out   │◀────────────────────────│   Verdict   │
//!                     └─────────────┘                         └─────────────┘
//!                      │     │     │
//!                      ▼     ▼     ▼
//!                  persist alert broadcast
//! ```

pub mod bridge;
pub mod classifier;
pub mod controller;
pub mod correlation;
pub mod fanout;
pub mod hub;
pub mod metrics;
pub mod model;
pub mod observation;
pub mod reading;
pub mod reconnect;
pub mod router;
pub mod sink;

pub use bridge::{Bridge, Outcome};
pub use classifier::{Classifier, ClassifierError, DecisionFunction, GOOD_THRESHOLD};
pub use controller::{BridgeController, BusConnector, BusError, BusSession, ConnectionState};
pub use correlation::{CacheConfig, CacheStats, CorrelationCache};
pub use fanout::{Emission, FanOut, FanOutConfig, FanOutWorkers, Sinks};
pub use hub::ObserverHub;
pub use model::{ComfortBand, DenseModel, ModelError};
pub use observation::{AudioEvent, PairedObservation, RawMessage, Reading, Verdict};
pub use reading::{Decoded, RejectReason};
pub use reconnect::ReconnectConfig;
pub use router::{ParsedTopic, TopicKind, TopicRouter};
pub use sink::{AlertPublisher, LiveBroadcaster, SinkError, SinkKind, TimeSeriesSink};
