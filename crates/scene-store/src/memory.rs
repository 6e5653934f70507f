//! In-memory store
//!
//! Keeps point states and objects in concurrent maps and fires change
//! events for subscribed ids on the event bus.

use dashmap::DashMap;
use scene_core::events::{ObjectChangedData, StateChangedData};
use scene_core::PointState;
use scene_event_bus::EventBus;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

use crate::error::StoreResult;
use crate::pattern::Pattern;
use crate::PointStore;

/// Initial content for a [`MemoryStore`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSeed {
    /// Objects keyed by id
    #[serde(default)]
    pub objects: HashMap<String, Value>,

    /// Point states keyed by id
    #[serde(default)]
    pub states: HashMap<String, PointState>,
}

/// The in-memory store
///
/// The MemoryStore is responsible for:
/// - Storing point states and objects
/// - Tracking state and object subscriptions
/// - Firing STATE_CHANGED / OBJECT_CHANGED events for subscribed ids
pub struct MemoryStore {
    /// Point states keyed by id
    states: DashMap<String, PointState>,
    /// Objects keyed by id
    objects: DashMap<String, Value>,
    /// Active point subscriptions keyed by pattern
    state_subscriptions: DashMap<String, Pattern>,
    /// Active object subscriptions keyed by pattern
    object_subscriptions: DashMap<String, Pattern>,
    /// Event bus for the change feed
    event_bus: Arc<EventBus>,
    /// Writer recorded on states set through this handle
    writer: String,
}

impl MemoryStore {
    /// Create an empty store publishing on the given bus
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            objects: DashMap::new(),
            state_subscriptions: DashMap::new(),
            object_subscriptions: DashMap::new(),
            event_bus,
            writer: "system.host".to_string(),
        }
    }

    /// Set the writer recorded on every state written through this store
    pub fn with_writer(mut self, writer: impl Into<String>) -> Self {
        self.writer = writer.into();
        self
    }

    /// Load initial objects and states without firing events
    pub fn seed(&self, seed: StoreSeed) {
        debug!(
            objects = seed.objects.len(),
            states = seed.states.len(),
            "Seeding store"
        );
        for (id, object) in seed.objects {
            self.objects.insert(id, object);
        }
        for (id, state) in seed.states {
            self.states.insert(id, state);
        }
    }

    /// Delete an object, firing OBJECT_CHANGED with no object
    #[instrument(skip(self))]
    pub fn delete_object(&self, id: &str) -> Option<Value> {
        let removed = self.objects.remove(id).map(|(_, o)| o);
        if removed.is_some() && self.object_subscribed(id) {
            self.event_bus.publish_typed(ObjectChangedData {
                id: id.to_string(),
                object: None,
            });
        }
        removed
    }

    /// Get the number of stored points
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Get the active point subscription patterns
    pub fn state_subscriptions(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self
            .state_subscriptions
            .iter()
            .map(|r| r.key().clone())
            .collect();
        patterns.sort();
        patterns
    }

    fn state_subscribed(&self, id: &str) -> bool {
        self.state_subscriptions.iter().any(|p| p.matches(id))
    }

    fn object_subscribed(&self, id: &str) -> bool {
        self.object_subscriptions.iter().any(|p| p.matches(id))
    }
}

impl PointStore for MemoryStore {
    fn get_state(&self, id: &str) -> StoreResult<Option<PointState>> {
        Ok(self.states.get(id).map(|s| s.clone()))
    }

    #[instrument(skip(self, val), fields(point_id = %id))]
    fn set_state(&self, id: &str, val: Value, ack: bool) -> StoreResult<()> {
        let state = PointState::new(val, ack).with_from(self.writer.clone());
        trace!(val = %state.val, ack, "Setting point state");
        self.states.insert(id.to_string(), state.clone());

        if self.state_subscribed(id) {
            self.event_bus.publish_typed(StateChangedData {
                id: id.to_string(),
                state: Some(state),
            });
        }
        Ok(())
    }

    fn get_object(&self, id: &str) -> StoreResult<Option<Value>> {
        Ok(self.objects.get(id).map(|o| o.clone()))
    }

    #[instrument(skip(self, object), fields(object_id = %id))]
    fn set_object(&self, id: &str, object: Value) -> StoreResult<()> {
        self.objects.insert(id.to_string(), object.clone());

        if self.object_subscribed(id) {
            self.event_bus.publish_typed(ObjectChangedData {
                id: id.to_string(),
                object: Some(object),
            });
        }
        Ok(())
    }

    fn list_objects(&self, prefix: &str, kind: &str) -> StoreResult<Vec<(String, Value)>> {
        let mut found: Vec<(String, Value)> = self
            .objects
            .iter()
            .filter(|r| r.key().starts_with(prefix))
            .filter(|r| r.value().get("type").and_then(Value::as_str) == Some(kind))
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    fn subscribe_states(&self, pattern: &str) -> StoreResult<()> {
        let compiled = Pattern::new(pattern)?;
        trace!(pattern, "Subscribing to states");
        self.state_subscriptions
            .insert(pattern.to_string(), compiled);
        Ok(())
    }

    fn unsubscribe_states(&self, pattern: &str) -> StoreResult<()> {
        trace!(pattern, "Unsubscribing from states");
        self.state_subscriptions.remove(pattern);
        Ok(())
    }

    fn unsubscribe_all_states(&self) -> StoreResult<()> {
        self.state_subscriptions.clear();
        Ok(())
    }

    fn subscribe_objects(&self, pattern: &str) -> StoreResult<()> {
        let compiled = Pattern::new(pattern)?;
        self.object_subscriptions
            .insert(pattern.to_string(), compiled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_core::events::{OBJECT_CHANGED, STATE_CHANGED};
    use serde_json::json;

    fn make_test_setup() -> (Arc<EventBus>, MemoryStore) {
        let event_bus = Arc::new(EventBus::new());
        let store = MemoryStore::new(event_bus.clone());
        (event_bus, store)
    }

    #[test]
    fn test_set_and_get_state() {
        let (_, store) = make_test_setup();
        store.set_state("hue.0.lamp.on", json!(true), false).unwrap();

        let state = store.get_state("hue.0.lamp.on").unwrap().unwrap();
        assert_eq!(state.val, json!(true));
        assert!(!state.ack);
        assert_eq!(state.from.as_deref(), Some("system.host"));
        assert!(store.get_state("hue.0.missing").unwrap().is_none());
    }

    #[test]
    fn test_list_objects_filters_prefix_and_kind() {
        let (_, store) = make_test_setup();
        store.seed(StoreSeed {
            objects: HashMap::from([
                ("scene.0.b".to_string(), json!({"type": "state"})),
                ("scene.0.a".to_string(), json!({"type": "state"})),
                ("scene.0.folder".to_string(), json!({"type": "channel"})),
                ("hue.0.lamp".to_string(), json!({"type": "state"})),
            ]),
            states: HashMap::new(),
        });

        let ids: Vec<String> = store
            .list_objects("scene.", "state")
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["scene.0.a", "scene.0.b"]);
    }

    #[tokio::test]
    async fn test_events_only_for_subscribed_states() {
        let (bus, store) = make_test_setup();
        let mut rx = bus.subscribe_all();

        store.subscribe_states("hue.0.*").unwrap();
        store.set_state("zigbee.0.plug", json!(1), true).unwrap();
        store.set_state("hue.0.lamp.on", json!(true), true).unwrap();

        let event = rx.recv().await.unwrap();
        assert!(event.is(STATE_CHANGED));
        assert_eq!(event.data["id"], "hue.0.lamp.on");
        assert!(rx.try_recv().is_err());

        store.unsubscribe_states("hue.0.*").unwrap();
        store.set_state("hue.0.lamp.on", json!(false), true).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_object_change_and_delete_events() {
        let (bus, store) = make_test_setup();
        let mut rx = bus.subscribe_all();
        store.subscribe_objects("scene.*").unwrap();

        store
            .set_object("scene.0.evening", json!({"type": "state"}))
            .unwrap();
        store.delete_object("scene.0.evening");

        let decode = |event: scene_core::Event| -> ObjectChangedData {
            assert!(event.is(OBJECT_CHANGED));
            serde_json::from_value(event.data).unwrap()
        };
        let created = decode(rx.recv().await.unwrap());
        assert!(created.object.is_some());
        let deleted = decode(rx.recv().await.unwrap());
        assert_eq!(deleted.id, "scene.0.evening");
        assert!(deleted.object.is_none());
    }

    #[test]
    fn test_unsubscribe_all_states() {
        let (_, store) = make_test_setup();
        store.subscribe_states("scene.*").unwrap();
        store.unsubscribe_all_states().unwrap();
        assert!(store.state_subscriptions().is_empty());
    }
}
