//! Change-feed event bus
//!
//! The store publishes point and object changes here. Consumers follow the
//! whole feed through one receiver, so point and object changes arrive in
//! publication order.

use scene_core::{Event, EventData};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Buffered events per receiver before it starts lagging
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast bus for change events
pub struct EventBus {
    feed: broadcast::Sender<Event<Value>>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus whose receivers buffer up to `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity);
        Self {
            feed,
            published: AtomicU64::new(0),
        }
    }

    /// Receive every event published from now on
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event<Value>> {
        trace!(receivers = self.feed.receiver_count() + 1, "New feed subscription");
        self.feed.subscribe()
    }

    /// Publish an event; returns how many receivers got it
    pub fn publish(&self, event: Event<Value>) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        // A send error only means nobody is listening
        self.feed.send(event).unwrap_or(0)
    }

    /// Publish a payload under its own event type
    pub fn publish_typed<T: EventData + Serialize>(&self, data: T) -> usize {
        let data = match serde_json::to_value(&data) {
            Ok(data) => data,
            Err(e) => {
                warn!(event_type = T::event_type(), error = %e, "Dropping unserializable event");
                return 0;
            }
        };
        let reached = self.publish(Event::new(T::event_type(), data));
        trace!(event_type = T::event_type(), reached, "Published change");
        reached
    }

    /// Total number of events published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_core::events::{ObjectChangedData, StateChangedData, STATE_CHANGED};
    use scene_core::PointState;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    #[tokio::test]
    async fn test_feed_keeps_publication_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_all();

        bus.publish_typed(StateChangedData {
            id: "hm-rpc.0.lamp.STATE".to_string(),
            state: Some(PointState::new(true, true)),
        });
        bus.publish_typed(ObjectChangedData {
            id: "scene.evening".to_string(),
            object: None,
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type.as_str(), "state_changed");
        assert_eq!(first.data["id"], json!("hm-rpc.0.lamp.STATE"));
        assert_eq!(first.data["state"]["val"], json!(true));
        assert_eq!(rx.recv().await.unwrap().event_type.as_str(), "object_changed");
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.publish(Event::new(STATE_CHANGED, json!({"id": "knx.0.hall"})));

        let mut rx = bus.subscribe_all();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(bus.published(), 1);
    }

    #[test]
    fn test_slow_receiver_lags() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe_all();
        for i in 0..3 {
            bus.publish(Event::new(STATE_CHANGED, json!({"id": format!("p{}", i)})));
        }

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(rx.try_recv().unwrap().data["id"], json!("p1"));
    }

    #[test]
    fn test_publish_reports_receivers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(Event::new(STATE_CHANGED, json!({}))), 0);

        let _first = bus.subscribe_all();
        let _second = bus.subscribe_all();
        assert_eq!(bus.publish(Event::new(STATE_CHANGED, json!({}))), 2);
        assert_eq!(bus.publish(Event::new("object_changed", json!({}))), 2);
    }
}
