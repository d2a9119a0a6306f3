//! Observer hub.
//!
//! Fans live-update events out to every connected observer over a
//! broadcast channel. Observers that fall behind lose the oldest events.

use crate::metrics;
use crate::sink::{LiveBroadcaster, SinkError};
use async_trait::async_trait;
use canopy_protocol::LiveEvent;
use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default broadcast channel capacity.
const DEFAULT_HUB_CAPACITY: usize = 1024;

/// Broadcast hub for live-update events.
#[derive(Debug)]
pub struct ObserverHub {
    /// Broadcast sender shared by all observers.
    sender: broadcast::Sender<Arc<LiveEvent>>,
    /// Connected observer IDs.
    observers: DashSet<String>,
    /// Channel capacity.
    capacity: usize,
}

impl ObserverHub {
    /// Create a new hub.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HUB_CAPACITY)
    }

    /// Create a new hub with a specific capacity.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            observers: DashSet::new(),
            capacity,
        }
    }

    /// Register an observer and return its event receiver.
    pub fn subscribe(&self, observer_id: impl Into<String>) -> broadcast::Receiver<Arc<LiveEvent>> {
        let observer_id = observer_id.into();
        debug!(observer = %observer_id, "Observer connected");
        self.observers.insert(observer_id);
        metrics::set_observers(self.observers.len());
        self.sender.subscribe()
    }

    /// Unregister an observer.
    ///
    /// Returns `true` if the observer was registered.
    pub fn unsubscribe(&self, observer_id: &str) -> bool {
        let removed = self.observers.remove(observer_id).is_some();
        if removed {
            debug!(observer = %observer_id, "Observer disconnected");
            metrics::set_observers(self.observers.len());
        }
        removed
    }

    /// Publish an event to all observers.
    ///
    /// Returns the number of receivers that got the event.
    pub fn publish(&self, event: LiveEvent) -> usize {
        trace!(event = event.name(), "Broadcasting live event");
        // No receivers is not an error
        self.sender.send(Arc::new(event)).unwrap_or_default()
    }

    /// Get the number of connected observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveBroadcaster for ObserverHub {
    async fn broadcast(&self, event: LiveEvent) -> Result<usize, SinkError> {
        Ok(self.publish(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_protocol::ObservationStatus;

    #[test]
    fn test_subscribe_unsubscribe() {
        let hub = ObserverHub::new();
        assert_eq!(hub.capacity(), DEFAULT_HUB_CAPACITY);

        let _rx1 = hub.subscribe("obs-1");
        let _rx2 = hub.subscribe("obs-2");
        assert_eq!(hub.observer_count(), 2);

        assert!(hub.unsubscribe("obs-1"));
        assert!(!hub.unsubscribe("obs-1"));
        assert_eq!(hub.observer_count(), 1);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let hub = ObserverHub::with_capacity(0);
        assert_eq!(hub.capacity(), 1);

        let mut rx = hub.subscribe("obs-1");
        assert_eq!(hub.publish(LiveEvent::audio("hall", "knock")), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_publish_without_observers() {
        let hub = ObserverHub::new();
        assert_eq!(hub.publish(LiveEvent::audio("hall", "knock")), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_observers() {
        let hub = ObserverHub::new();
        let mut rx1 = hub.subscribe("obs-1");
        let mut rx2 = hub.subscribe("obs-2");

        let event = LiveEvent::observation("kitchen", 22.0, 40.0, ObservationStatus::Good);
        assert_eq!(hub.broadcast(event.clone()).await.unwrap(), 2);

        assert_eq!(*rx1.recv().await.unwrap(), event);
        assert_eq!(*rx2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_lagging_observer() {
        let hub = ObserverHub::with_capacity(2);
        let mut rx = hub.subscribe("slow");

        for i in 0..4 {
            hub.publish(LiveEvent::audio("hall", format!("tick-{i}")));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(*rx.recv().await.unwrap(), LiveEvent::audio("hall", "tick-2"));
    }
}
