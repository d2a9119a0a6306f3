//! The per-message pipeline.
//!
//! ```text
//! RawMessage ─▶ TopicRouter ─▶ decode ─┬─▶ Reading ─▶ persist
//!                                      │      │
//!                                      │      ▼
//!                                      │  CorrelationCache ─▶ Classifier ─▶ alert + broadcast
//!                                      │
//!                                      └─▶ AudioEvent ─▶ broadcast
//! ```
//!
//! [`Bridge::handle`] runs this chain for one message. Callers that need the
//! ordering guarantees of the correlation cache must not start the next
//! message for the same location before the previous call returns.

use crate::classifier::Classifier;
use crate::correlation::{CacheStats, CorrelationCache};
use crate::fanout::{Emission, FanOut};
use crate::metrics;
use crate::observation::{status_of, PairedObservation, RawMessage};
use crate::reading::{decode, Decoded, RejectReason};
use crate::router::TopicRouter;
use canopy_protocol::ObservationStatus;
use std::time::Instant;
use tracing::{debug, trace};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The message was dropped.
    Dropped(RejectReason),
    /// A reading was persisted and is waiting for its counterpart.
    Buffered,
    /// A reading completed a pair, which was classified.
    Paired {
        /// The completed pair.
        observation: PairedObservation,
        /// Status reported to observers.
        status: ObservationStatus,
    },
    /// An audio token was forwarded.
    Audio,
}

impl Outcome {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Dropped(reason) => reason.label(),
            Outcome::Buffered => "buffered",
            Outcome::Paired { .. } => "paired",
            Outcome::Audio => "audio",
        }
    }
}

/// Owns the pipeline stages and runs them for each message.
#[derive(Debug)]
pub struct Bridge {
    router: TopicRouter,
    cache: CorrelationCache,
    classifier: Classifier,
    fanout: FanOut,
}

impl Bridge {
    /// Assemble a bridge from its stages.
    #[must_use]
    pub fn new(
        router: TopicRouter,
        cache: CorrelationCache,
        classifier: Classifier,
        fanout: FanOut,
    ) -> Self {
        Self {
            router,
            cache,
            classifier,
            fanout,
        }
    }

    /// Get the topic router.
    #[must_use]
    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    /// Get the correlation cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Prune stale partial readings; see [`CorrelationCache::prune_stale`].
    pub fn prune_stale(&self) -> usize {
        let pruned = self.cache.prune_stale();
        metrics::set_pending_locations(self.cache.stats().location_count);
        pruned
    }

    /// Run the pipeline for one message.
    pub async fn handle(&self, message: RawMessage) -> Outcome {
        trace!(topic = %message.topic, bytes = message.payload_size(), "Handling message");

        let parsed = self.router.route(&message.topic);
        let outcome = match decode(&parsed, &message.payload) {
            Decoded::Rejected(reason) => {
                debug!(topic = %message.topic, reason = %reason, "Dropped message");
                Outcome::Dropped(reason)
            }
            Decoded::Audio(audio) => {
                self.fanout.emit(Emission::audio(audio));
                Outcome::Audio
            }
            Decoded::Reading(reading) => {
                metrics::record_reading();
                let paired = self.cache.ingest(&reading);
                self.fanout.emit(Emission::reading(reading));
                metrics::set_pending_locations(self.cache.stats().location_count);

                match paired {
                    Some(observation) => self.classify_and_emit(observation).await,
                    None => Outcome::Buffered,
                }
            }
        };

        metrics::record_message(outcome.label());
        outcome
    }

    async fn classify_and_emit(&self, observation: PairedObservation) -> Outcome {
        let start = Instant::now();
        // Failure is already logged by the classifier
        let verdict = self.classifier.classify(&observation).await.ok();
        metrics::record_classify_latency(start.elapsed().as_secs_f64());

        let status = status_of(verdict.as_ref());
        metrics::record_pair(status.as_str());

        self.fanout
            .emit(Emission::observation(observation.clone(), verdict));

        Outcome::Paired {
            observation,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::{Broken, FixedScore};
    use crate::classifier::DecisionFunction;
    use crate::fanout::testing::{Recorders, RecordingStore};
    use crate::fanout::{FanOutConfig, FanOutWorkers};
    use canopy_protocol::LiveEvent;
    use std::sync::Arc;

    fn bridge(
        model: Arc<dyn DecisionFunction>,
        store: RecordingStore,
    ) -> (Bridge, FanOutWorkers, Recorders) {
        let rec = Recorders::new(store);
        let (fanout, workers) = FanOut::spawn(rec.sinks(), FanOutConfig::default());
        let bridge = Bridge::new(
            TopicRouter::new(),
            CorrelationCache::new(),
            Classifier::new(model),
            fanout,
        );
        (bridge, workers, rec)
    }

    #[tokio::test]
    async fn test_end_to_end_good_pair() {
        let (bridge, workers, rec) = bridge(Arc::new(FixedScore(0.9)), RecordingStore::default());

        let first = bridge
            .handle(RawMessage::new("home/kitchen/temperature", "22.0"))
            .await;
        assert_eq!(first, Outcome::Buffered);

        let second = bridge
            .handle(RawMessage::new("home/kitchen/humidity", "40.0"))
            .await;
        assert_eq!(
            second,
            Outcome::Paired {
                observation: PairedObservation::new("kitchen", 22.0, 40.0),
                status: ObservationStatus::Good,
            }
        );

        drop(bridge);
        workers.join().await;

        assert_eq!(
            rec.store.lines(),
            vec![
                "temperature,location=kitchen value=22",
                "humidity,location=kitchen value=40",
            ]
        );
        assert_eq!(
            rec.events(),
            vec![LiveEvent::observation("kitchen", 22.0, 40.0, ObservationStatus::Good)]
        );
        assert_eq!(rec.alert_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_pair_publishes_one_alert() {
        let (bridge, workers, rec) = bridge(Arc::new(FixedScore(0.2)), RecordingStore::default());

        bridge
            .handle(RawMessage::new("home/kitchen/humidity", "40.0"))
            .await;
        let outcome = bridge
            .handle(RawMessage::new("home/kitchen/temperature", "22.0"))
            .await;
        assert_eq!(outcome.label(), "paired");

        drop(bridge);
        workers.join().await;

        assert_eq!(rec.alert_count(), 1);
        assert_eq!(
            rec.events(),
            vec![LiveEvent::observation("kitchen", 22.0, 40.0, ObservationStatus::Bad)]
        );
    }

    #[tokio::test]
    async fn test_store_failure_still_classifies_and_broadcasts() {
        let (bridge, workers, rec) = bridge(Arc::new(FixedScore(0.9)), RecordingStore::failing());

        bridge
            .handle(RawMessage::new("home/kitchen/temperature", "22.0"))
            .await;
        let outcome = bridge
            .handle(RawMessage::new("home/kitchen/humidity", "40.0"))
            .await;
        assert!(matches!(
            outcome,
            Outcome::Paired {
                status: ObservationStatus::Good,
                ..
            }
        ));

        drop(bridge);
        workers.join().await;

        assert!(rec.store.lines().is_empty());
        assert_eq!(
            rec.events(),
            vec![LiveEvent::observation("kitchen", 22.0, 40.0, ObservationStatus::Good)]
        );
    }

    #[tokio::test]
    async fn test_classifier_failure_reports_unknown() {
        let (bridge, workers, rec) = bridge(Arc::new(Broken), RecordingStore::default());

        bridge
            .handle(RawMessage::new("home/kitchen/temperature", "22.0"))
            .await;
        bridge
            .handle(RawMessage::new("home/kitchen/humidity", "40.0"))
            .await;

        drop(bridge);
        workers.join().await;

        assert_eq!(rec.store.lines().len(), 2);
        assert_eq!(rec.alert_count(), 0);
        assert_eq!(
            rec.events(),
            vec![LiveEvent::observation("kitchen", 22.0, 40.0, ObservationStatus::Unknown)]
        );
    }

    #[tokio::test]
    async fn test_dropped_and_audio_messages() {
        let (bridge, workers, rec) = bridge(Arc::new(FixedScore(0.9)), RecordingStore::default());

        assert_eq!(
            bridge.handle(RawMessage::new("bogus", "1")).await,
            Outcome::Dropped(RejectReason::MalformedTopic)
        );
        assert_eq!(
            bridge
                .handle(RawMessage::new("home/kitchen/status", "online"))
                .await,
            Outcome::Dropped(RejectReason::Control)
        );
        assert!(matches!(
            bridge
                .handle(RawMessage::new("home/kitchen/humidity", "not-a-number"))
                .await,
            Outcome::Dropped(RejectReason::InvalidPayload(_))
        ));
        assert_eq!(
            bridge
                .handle(RawMessage::new("home/hall/audio", "doorbell"))
                .await,
            Outcome::Audio
        );

        drop(bridge);
        workers.join().await;

        assert!(rec.store.lines().is_empty());
        assert_eq!(rec.events(), vec![LiveEvent::audio("hall", "doorbell")]);
    }

    #[tokio::test]
    async fn test_unpaired_reading_is_persisted() {
        let (bridge, workers, rec) = bridge(Arc::new(FixedScore(0.9)), RecordingStore::default());

        bridge
            .handle(RawMessage::new("home/garage/battery", "3.7"))
            .await;
        assert_eq!(bridge.cache_stats().pending_values, 1);

        drop(bridge);
        workers.join().await;

        assert_eq!(rec.store.lines(), vec!["battery,location=garage value=3.7"]);
        assert!(rec.events().is_empty());
    }
}
