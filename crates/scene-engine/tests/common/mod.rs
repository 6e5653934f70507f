//! Common test utilities for the scene engine
//!
//! Provides a recording in-memory store and helpers for building scene
//! definitions and driving an engine on a manual clock.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use scene_config::EngineSettings;
use scene_core::PointState;
use scene_engine::SceneEngine;
use scene_store::{PointStore, StoreError, StoreResult};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A state write seen by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub id: String,
    pub val: Value,
    pub ack: bool,
}

impl Write {
    pub fn new(id: &str, val: Value, ack: bool) -> Self {
        Self {
            id: id.to_string(),
            val,
            ack,
        }
    }
}

/// In-memory store that records every write and subscription
///
/// Unlike the real store it fires no change events; tests feed updates to
/// the engine explicitly.
#[derive(Default)]
pub struct RecordingStore {
    states: RwLock<HashMap<String, PointState>>,
    objects: RwLock<BTreeMap<String, Value>>,
    writes: RwLock<Vec<Write>>,
    subscriptions: RwLock<Vec<String>>,
    object_subscriptions: RwLock<Vec<String>>,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object without recording anything
    pub fn put_object(&self, id: &str, object: Value) {
        self.objects.write().unwrap().insert(id.to_string(), object);
    }

    /// Store a point value without recording a write
    pub fn put_state(&self, id: &str, val: Value) {
        self.states
            .write()
            .unwrap()
            .insert(id.to_string(), PointState::new(val, true));
    }

    pub fn remove_object(&self, id: &str) -> Option<Value> {
        self.objects.write().unwrap().remove(id)
    }

    pub fn object(&self, id: &str) -> Option<Value> {
        self.objects.read().unwrap().get(id).cloned()
    }

    /// All writes in order
    pub fn writes(&self) -> Vec<Write> {
        self.writes.read().unwrap().clone()
    }

    /// Values written to one point, in order
    pub fn writes_to(&self, id: &str) -> Vec<Value> {
        self.writes
            .read()
            .unwrap()
            .iter()
            .filter(|w| w.id == id)
            .map(|w| w.val.clone())
            .collect()
    }

    /// Return and forget all writes so far
    pub fn take_writes(&self) -> Vec<Write> {
        std::mem::take(&mut *self.writes.write().unwrap())
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.read().unwrap().clone()
    }

    pub fn object_subscriptions(&self) -> Vec<String> {
        self.object_subscriptions.read().unwrap().clone()
    }

    /// Make every state write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl PointStore for RecordingStore {
    fn get_state(&self, id: &str) -> StoreResult<Option<PointState>> {
        Ok(self.states.read().unwrap().get(id).cloned())
    }

    fn set_state(&self, id: &str, val: Value, ack: bool) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection lost".to_string()));
        }
        self.writes
            .write()
            .unwrap()
            .push(Write::new(id, val.clone(), ack));
        self.states
            .write()
            .unwrap()
            .insert(id.to_string(), PointState::new(val, ack));
        Ok(())
    }

    fn get_object(&self, id: &str) -> StoreResult<Option<Value>> {
        Ok(self.object(id))
    }

    fn set_object(&self, id: &str, object: Value) -> StoreResult<()> {
        self.put_object(id, object);
        Ok(())
    }

    fn list_objects(&self, prefix: &str, kind: &str) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .objects
            .read()
            .unwrap()
            .iter()
            .filter(|(id, object)| {
                id.starts_with(prefix) && object.get("type").and_then(Value::as_str) == Some(kind)
            })
            .map(|(id, object)| (id.clone(), object.clone()))
            .collect())
    }

    fn subscribe_states(&self, pattern: &str) -> StoreResult<()> {
        self.subscriptions.write().unwrap().push(pattern.to_string());
        Ok(())
    }

    fn unsubscribe_states(&self, pattern: &str) -> StoreResult<()> {
        self.subscriptions.write().unwrap().retain(|p| p != pattern);
        Ok(())
    }

    fn unsubscribe_all_states(&self) -> StoreResult<()> {
        self.subscriptions.write().unwrap().clear();
        Ok(())
    }

    fn subscribe_objects(&self, pattern: &str) -> StoreResult<()> {
        self.object_subscriptions
            .write()
            .unwrap()
            .push(pattern.to_string());
        Ok(())
    }
}

/// Fixed start of the manual clock
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// `t0` plus `millis`
pub fn at(millis: i64) -> DateTime<Utc> {
    t0() + Duration::milliseconds(millis)
}

/// A scene object owned by `system.adapter.scenes.0`
pub fn scene_object(native: Value) -> Value {
    json!({
        "type": "state",
        "common": {
            "name": "test scene",
            "enabled": true,
            "engine": "system.adapter.scenes.0"
        },
        "native": native
    })
}

/// A member entry
pub fn member(id: &str, set_if_true: Value, set_if_false: Value) -> Value {
    json!({"id": id, "setIfTrue": set_if_true, "setIfFalse": set_if_false})
}

/// Build a store holding `scenes` and a started engine over it
pub fn make_test_setup(
    scenes: Vec<(&str, Value)>,
) -> (SceneEngine<RecordingStore>, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::new());
    for (id, object) in scenes {
        store.put_object(id, object);
    }
    let mut engine = SceneEngine::new(Arc::clone(&store), EngineSettings::default(), t0());
    engine.start().unwrap();
    (engine, store)
}

/// Move the clock to `millis` after `t0` and deliver a point update
pub fn update(
    engine: &mut SceneEngine<RecordingStore>,
    millis: i64,
    id: &str,
    val: Value,
    ack: bool,
) {
    engine.advance_to(at(millis));
    engine.on_point_update(id, &PointState::new(val, ack));
}
