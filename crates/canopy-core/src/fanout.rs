//! Sink fan-out.
//!
//! Every effect is queued to a dedicated worker per sink. Queues are bounded
//! and enqueueing never waits: when a sink falls behind its queue fills and
//! further effects for that sink are dropped, while the other sinks and the
//! inbound message loop carry on. One worker per sink keeps each sink's
//! effects in arrival order.

use crate::metrics;
use crate::observation::{status_of, AudioEvent, PairedObservation, Reading, Verdict};
use crate::sink::{AlertPublisher, LiveBroadcaster, SinkKind, TimeSeriesSink};
use canopy_protocol::topic::alert_message;
use canopy_protocol::{alert_topic, LiveEvent, Point, DEFAULT_NAMESPACE};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Default per-sink queue capacity.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Fan-out configuration.
#[derive(Debug, Clone)]
pub struct FanOutConfig {
    /// Capacity of each sink queue.
    pub queue_capacity: usize,
    /// Topic alerts are published on.
    pub alert_topic: String,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            alert_topic: alert_topic(DEFAULT_NAMESPACE),
        }
    }
}

/// The three output collaborators.
#[derive(Clone)]
pub struct Sinks {
    /// Time-series store.
    pub store: Arc<dyn TimeSeriesSink>,
    /// Alert publisher.
    pub alerts: Arc<dyn AlertPublisher>,
    /// Live-update broadcaster.
    pub live: Arc<dyn LiveBroadcaster>,
}

/// An alert waiting to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Alert {
    topic: String,
    location: String,
    message: String,
}

/// A classified observation ready for alerting and broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    /// The completed pair.
    pub observation: PairedObservation,
    /// Verdict, or `None` if classification failed.
    pub verdict: Option<Verdict>,
}

/// The effects produced by one pipeline step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emission {
    /// Decoded readings to persist.
    pub readings: Vec<Reading>,
    /// Classified observation to alert on and broadcast.
    pub observation: Option<Classified>,
    /// Audio token to broadcast.
    pub audio: Option<AudioEvent>,
}

impl Emission {
    /// Persist a single reading.
    #[must_use]
    pub fn reading(reading: Reading) -> Self {
        Self {
            readings: vec![reading],
            ..Default::default()
        }
    }

    /// Alert on and broadcast a classified observation.
    #[must_use]
    pub fn observation(observation: PairedObservation, verdict: Option<Verdict>) -> Self {
        Self {
            observation: Some(Classified {
                observation,
                verdict,
            }),
            ..Default::default()
        }
    }

    /// Broadcast an audio token.
    #[must_use]
    pub fn audio(audio: AudioEvent) -> Self {
        Self {
            audio: Some(audio),
            ..Default::default()
        }
    }
}

/// Enqueuing side of the fan-out. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FanOut {
    persist_tx: mpsc::Sender<Point>,
    alert_tx: mpsc::Sender<Alert>,
    broadcast_tx: mpsc::Sender<LiveEvent>,
    alert_topic: String,
}

/// Handles to the sink workers.
#[derive(Debug)]
pub struct FanOutWorkers {
    handles: Vec<(SinkKind, JoinHandle<()>)>,
}

impl FanOutWorkers {
    /// Wait for every worker to drain its queue.
    ///
    /// Workers finish once every [`FanOut`] handle has been dropped.
    pub async fn join(self) {
        for (kind, handle) in self.handles {
            if let Err(e) = handle.await {
                warn!(sink = %kind, error = %e, "Sink worker terminated abnormally");
            }
        }
        debug!("Fan-out workers drained");
    }
}

impl FanOut {
    /// Spawn one worker per sink.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(sinks: Sinks, config: FanOutConfig) -> (Self, FanOutWorkers) {
        let capacity = config.queue_capacity.max(1);
        info!(capacity, alert_topic = %config.alert_topic, "Starting sink fan-out");

        let (persist_tx, persist_rx) = mpsc::channel(capacity);
        let (alert_tx, alert_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);

        let handles = vec![
            (
                SinkKind::Persist,
                tokio::spawn(persist_worker(persist_rx, sinks.store)),
            ),
            (
                SinkKind::Alert,
                tokio::spawn(alert_worker(alert_rx, sinks.alerts)),
            ),
            (
                SinkKind::Broadcast,
                tokio::spawn(broadcast_worker(broadcast_rx, sinks.live)),
            ),
        ];

        let fanout = Self {
            persist_tx,
            alert_tx,
            broadcast_tx,
            alert_topic: config.alert_topic,
        };
        (fanout, FanOutWorkers { handles })
    }

    /// Get the alert topic.
    #[must_use]
    pub fn alert_topic(&self) -> &str {
        &self.alert_topic
    }

    /// Queue every effect of an emission. Never waits.
    pub fn emit(&self, emission: Emission) {
        for reading in &emission.readings {
            enqueue(&self.persist_tx, reading.to_point(), SinkKind::Persist);
        }

        if let Some(Classified {
            observation,
            verdict,
        }) = emission.observation
        {
            // Alert only on a definite bad verdict
            if matches!(verdict, Some(Verdict { good: false, .. })) {
                let alert = Alert {
                    topic: self.alert_topic.clone(),
                    message: alert_message(&observation.location),
                    location: observation.location.clone(),
                };
                enqueue(&self.alert_tx, alert, SinkKind::Alert);
            }

            let status = status_of(verdict.as_ref());
            enqueue(
                &self.broadcast_tx,
                observation.to_live_event(status),
                SinkKind::Broadcast,
            );
        }

        if let Some(audio) = emission.audio {
            enqueue(&self.broadcast_tx, audio.to_live_event(), SinkKind::Broadcast);
        }
    }
}

fn enqueue<T>(tx: &mpsc::Sender<T>, item: T, kind: SinkKind) {
    match tx.try_send(item) {
        Ok(()) => trace!(sink = %kind, "Queued effect"),
        Err(TrySendError::Full(_)) => {
            warn!(sink = %kind, "Sink queue full, dropping effect");
            metrics::record_sink_dropped(kind.as_str());
        }
        Err(TrySendError::Closed(_)) => {
            warn!(sink = %kind, "Sink worker stopped, dropping effect");
            metrics::record_sink_dropped(kind.as_str());
        }
    }
}

async fn persist_worker(mut rx: mpsc::Receiver<Point>, store: Arc<dyn TimeSeriesSink>) {
    while let Some(point) = rx.recv().await {
        if let Err(e) = store.write(&point).await {
            warn!(
                sink = "persist",
                measurement = %point.measurement,
                error = %e,
                "Failed to persist point"
            );
            metrics::record_sink_error(SinkKind::Persist.as_str());
        }
    }
    debug!(sink = "persist", "Sink worker stopped");
}

async fn alert_worker(mut rx: mpsc::Receiver<Alert>, alerts: Arc<dyn AlertPublisher>) {
    while let Some(alert) = rx.recv().await {
        match alerts.publish(&alert.topic, alert.message).await {
            Ok(()) => {
                info!(location = %alert.location, topic = %alert.topic, "Published alert");
                metrics::record_alert();
            }
            Err(e) => {
                warn!(
                    sink = "alert",
                    location = %alert.location,
                    error = %e,
                    "Failed to publish alert"
                );
                metrics::record_sink_error(SinkKind::Alert.as_str());
            }
        }
    }
    debug!(sink = "alert", "Sink worker stopped");
}

async fn broadcast_worker(mut rx: mpsc::Receiver<LiveEvent>, live: Arc<dyn LiveBroadcaster>) {
    while let Some(event) = rx.recv().await {
        let name = event.name();
        match live.broadcast(event).await {
            Ok(recipients) => trace!(event = name, recipients, "Broadcast live event"),
            Err(e) => {
                warn!(sink = "broadcast", event = name, error = %e, "Failed to broadcast");
                metrics::record_sink_error(SinkKind::Broadcast.as_str());
            }
        }
    }
    debug!(sink = "broadcast", "Sink worker stopped");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// Records every point; optionally fails every write.
    #[derive(Default)]
    pub struct RecordingStore {
        pub points: Mutex<Vec<Point>>,
        pub fail: bool,
    }

    impl RecordingStore {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn lines(&self) -> Vec<String> {
            self.points
                .lock()
                .unwrap()
                .iter()
                .map(Point::to_line)
                .collect()
        }
    }

    #[async_trait]
    impl TimeSeriesSink for RecordingStore {
        async fn write(&self, point: &Point) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Unavailable("connection refused".into()));
            }
            self.points.lock().unwrap().push(point.clone());
            Ok(())
        }
    }

    /// Store that blocks until permits are added.
    pub struct GatedStore {
        pub gate: Semaphore,
        pub inner: RecordingStore,
    }

    #[async_trait]
    impl TimeSeriesSink for GatedStore {
        async fn write(&self, point: &Point) -> Result<(), SinkError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| SinkError::Other(e.to_string()))?;
            self.inner.write(point).await
        }
    }

    /// Records every published alert.
    #[derive(Default)]
    pub struct RecordingAlerts {
        pub published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl AlertPublisher for RecordingAlerts {
        async fn publish(&self, topic: &str, payload: String) -> Result<(), SinkError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload));
            Ok(())
        }
    }

    /// Records every broadcast event.
    #[derive(Default)]
    pub struct RecordingLive {
        pub events: Mutex<Vec<LiveEvent>>,
    }

    #[async_trait]
    impl LiveBroadcaster for RecordingLive {
        async fn broadcast(&self, event: LiveEvent) -> Result<usize, SinkError> {
            self.events.lock().unwrap().push(event);
            Ok(1)
        }
    }

    pub struct Recorders {
        pub store: Arc<RecordingStore>,
        pub alerts: Arc<RecordingAlerts>,
        pub live: Arc<RecordingLive>,
    }

    impl Recorders {
        pub fn new(store: RecordingStore) -> Self {
            Self {
                store: Arc::new(store),
                alerts: Arc::new(RecordingAlerts::default()),
                live: Arc::new(RecordingLive::default()),
            }
        }

        pub fn sinks(&self) -> Sinks {
            Sinks {
                store: self.store.clone(),
                alerts: self.alerts.clone(),
                live: self.live.clone(),
            }
        }

        pub fn alert_count(&self) -> usize {
            self.alerts.published.lock().unwrap().len()
        }

        pub fn events(&self) -> Vec<LiveEvent> {
            self.live.events.lock().unwrap().clone()
        }
    }
}
