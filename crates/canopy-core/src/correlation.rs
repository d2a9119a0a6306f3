//! Correlation cache.
//!
//! Accumulates partial readings per location until a temperature and a
//! humidity reading are both pending, then yields them as one
//! [`PairedObservation`]. All mutation goes through [`CorrelationCache::ingest`];
//! the check-and-remove of a pair happens while holding the location's shard
//! lock, so no reader ever observes a half-removed pair.

use crate::observation::{PairedObservation, Reading};
use canopy_protocol::topic::{HUMIDITY, TEMPERATURE};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Correlation cache configuration.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// How long a partial reading may wait for its counterpart.
    ///
    /// `None` keeps partial readings indefinitely.
    pub retention: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
struct PendingValue {
    value: f64,
    received_at: Instant,
}

/// Pending readings for one location.
#[derive(Debug, Default)]
struct CorrelationState {
    pending: HashMap<String, PendingValue>,
}

impl CorrelationState {
    /// Remove and return the pair if both halves are pending.
    fn take_pair(&mut self) -> Option<(f64, f64)> {
        if !(self.pending.contains_key(TEMPERATURE) && self.pending.contains_key(HUMIDITY)) {
            return None;
        }
        let temperature = self.pending.remove(TEMPERATURE)?.value;
        let humidity = self.pending.remove(HUMIDITY)?.value;
        Some((temperature, humidity))
    }
}

/// Per-location accumulator of partial readings.
#[derive(Debug, Default)]
pub struct CorrelationCache {
    states: DashMap<String, CorrelationState>,
    config: CacheConfig,
}

impl CorrelationCache {
    /// Create a cache that never evicts partial readings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache with custom configuration.
    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        debug!(retention = ?config.retention, "Creating correlation cache");
        Self {
            states: DashMap::new(),
            config,
        }
    }

    /// Get the configured retention.
    #[must_use]
    pub fn retention(&self) -> Option<Duration> {
        self.config.retention
    }

    /// Record a reading and return a completed pair, if any.
    ///
    /// A later reading for the same measurement replaces the earlier one.
    /// Measurements outside the pairing rule are kept but never complete a
    /// pair on their own.
    pub fn ingest(&self, reading: &Reading) -> Option<PairedObservation> {
        let mut state = self.states.entry(reading.location.clone()).or_default();

        let previous = state.pending.insert(
            reading.measurement.clone(),
            PendingValue {
                value: reading.value,
                received_at: Instant::now(),
            },
        );
        if let Some(previous) = previous {
            trace!(
                location = %reading.location,
                measurement = %reading.measurement,
                replaced = previous.value,
                "Replaced pending reading"
            );
        }

        let (temperature, humidity) = state.take_pair()?;
        let now_empty = state.pending.is_empty();
        drop(state); // Release the shard lock

        if now_empty {
            self.states
                .remove_if(&reading.location, |_, s| s.pending.is_empty());
        }

        debug!(location = %reading.location, temperature, humidity, "Paired observation");
        Some(PairedObservation::new(
            reading.location.clone(),
            temperature,
            humidity,
        ))
    }

    /// Snapshot of the pending values for a location, sorted by measurement.
    #[must_use]
    pub fn pending(&self, location: &str) -> Vec<(String, f64)> {
        let mut values: Vec<(String, f64)> = self
            .states
            .get(location)
            .map(|s| {
                s.pending
                    .iter()
                    .map(|(name, p)| (name.clone(), p.value))
                    .collect()
            })
            .unwrap_or_default();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        values
    }

    /// Check if a location has any pending state.
    #[must_use]
    pub fn contains_location(&self, location: &str) -> bool {
        self.states.contains_key(location)
    }

    /// Remove pending values older than the retention window.
    ///
    /// Returns the number of values removed. Does nothing without retention.
    pub fn prune_stale(&self) -> usize {
        self.prune_stale_at(Instant::now())
    }

    /// Remove pending values older than the retention window as of `now`.
    pub fn prune_stale_at(&self, now: Instant) -> usize {
        let Some(retention) = self.config.retention else {
            return 0;
        };

        let mut removed = 0;
        self.states.retain(|location, state| {
            let before = state.pending.len();
            state
                .pending
                .retain(|_, p| now.saturating_duration_since(p.received_at) <= retention);
            let pruned = before - state.pending.len();
            if pruned > 0 {
                debug!(location = %location, pruned, "Pruned stale pending readings");
            }
            removed += pruned;
            !state.pending.is_empty()
        });
        removed
    }

    /// Get cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            location_count: self.states.len(),
            pending_values: self.states.iter().map(|s| s.pending.len()).sum(),
        }
    }
}

/// Correlation cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Locations with pending state.
    pub location_count: usize,
    /// Total pending values across all locations.
    pub pending_values: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn reading(location: &str, measurement: &str, value: f64) -> Reading {
        Reading::new(location, measurement, value)
    }

    #[test]
    fn test_pair_in_either_order() {
        let cache = CorrelationCache::new();

        assert!(cache.ingest(&reading("kitchen", "temperature", 22.0)).is_none());
        let paired = cache.ingest(&reading("kitchen", "humidity", 40.0)).unwrap();
        assert_eq!(paired, PairedObservation::new("kitchen", 22.0, 40.0));
        assert!(cache.pending("kitchen").is_empty());
        assert!(!cache.contains_location("kitchen"));

        assert!(cache.ingest(&reading("attic", "humidity", 65.0)).is_none());
        let paired = cache.ingest(&reading("attic", "temperature", 30.5)).unwrap();
        assert_eq!(paired, PairedObservation::new("attic", 30.5, 65.0));
        assert!(cache.pending("attic").is_empty());
    }

    #[test]
    fn test_stray_measurement_does_not_block_pairing() {
        let cache = CorrelationCache::new();

        assert!(cache.ingest(&reading("kitchen", "temperature", 22.0)).is_none());
        assert!(cache.ingest(&reading("kitchen", "battery", 3.1)).is_none());
        let paired = cache.ingest(&reading("kitchen", "humidity", 40.0)).unwrap();
        assert_eq!(paired, PairedObservation::new("kitchen", 22.0, 40.0));

        // The stray value outlives the pair
        assert_eq!(cache.pending("kitchen"), vec![("battery".to_string(), 3.1)]);
    }

    #[test]
    fn test_stray_measurement_alone_never_pairs() {
        let cache = CorrelationCache::new();

        assert!(cache.ingest(&reading("garage", "battery", 3.1)).is_none());
        assert!(cache.ingest(&reading("garage", "pressure", 1013.0)).is_none());
        assert!(cache.ingest(&reading("garage", "temperature", 12.0)).is_none());
        assert_eq!(cache.stats().pending_values, 3);
    }

    #[test]
    fn test_last_write_wins() {
        let cache = CorrelationCache::new();

        assert!(cache.ingest(&reading("kitchen", "temperature", 18.0)).is_none());
        assert!(cache.ingest(&reading("kitchen", "temperature", 23.5)).is_none());
        let paired = cache.ingest(&reading("kitchen", "humidity", 41.0)).unwrap();
        assert_eq!(paired.temperature, 23.5);

        // Nothing left over to pair with the next humidity reading
        assert!(cache.ingest(&reading("kitchen", "humidity", 42.0)).is_none());
    }

    #[test]
    fn test_locations_are_independent() {
        let cache = CorrelationCache::new();

        assert!(cache.ingest(&reading("kitchen", "temperature", 22.0)).is_none());
        assert!(cache.ingest(&reading("bedroom", "humidity", 50.0)).is_none());
        assert_eq!(cache.stats().location_count, 2);

        let paired = cache.ingest(&reading("bedroom", "temperature", 19.0)).unwrap();
        assert_eq!(paired.location, "bedroom");
        assert_eq!(cache.pending("kitchen"), vec![("temperature".to_string(), 22.0)]);
    }

    #[test]
    fn test_prune_without_retention_keeps_everything() {
        let cache = CorrelationCache::new();
        cache.ingest(&reading("kitchen", "temperature", 22.0));

        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(cache.prune_stale_at(later), 0);
        assert!(cache.contains_location("kitchen"));
    }

    #[test]
    fn test_prune_with_retention() {
        let cache = CorrelationCache::with_config(CacheConfig {
            retention: Some(Duration::from_secs(60)),
        });
        cache.ingest(&reading("kitchen", "temperature", 22.0));
        cache.ingest(&reading("kitchen", "battery", 3.0));

        assert_eq!(cache.prune_stale_at(Instant::now()), 0);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(cache.prune_stale_at(later), 2);
        assert!(!cache.contains_location("kitchen"));
        assert_eq!(cache.stats().location_count, 0);
    }

    #[test]
    fn test_concurrent_ingest_pairs_exactly_once() {
        let cache = Arc::new(CorrelationCache::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let measurement = if i % 2 == 0 { "temperature" } else { "humidity" };
                    cache
                        .ingest(&reading(&format!("room-{}", i / 2), measurement, i as f64))
                        .is_some()
                })
            })
            .collect();

        let pairs = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|paired| *paired)
            .count();

        assert_eq!(pairs, 4);
        assert_eq!(cache.stats().location_count, 0);
    }
}
