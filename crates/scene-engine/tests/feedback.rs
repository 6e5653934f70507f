//! End-to-end tests over the in-memory store and its change feed

mod common;

use common::{at, t0};
use scene_config::EngineSettings;
use scene_core::Event;
use scene_engine::SceneEngine;
use scene_event_bus::EventBus;
use scene_store::{MemoryStore, PointStore, StoreSeed};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

const DEVICES: [&str; 2] = ["hue.0.lamp.on", "hue.0.lamp.level"];

fn living_room() -> Value {
    json!({
        "type": "state",
        "common": {
            "name": "Living room",
            "enabled": true,
            "engine": "system.adapter.scenes.0"
        },
        "native": {
            "members": [
                {"id": "hue.0.lamp.on", "setIfTrue": true, "setIfFalse": false},
                {"id": "hue.0.lamp.level", "setIfTrue": 80, "setIfFalse": 0}
            ],
            "onFalse": {"enabled": true}
        }
    })
}

struct Harness {
    engine: SceneEngine<MemoryStore>,
    store: Arc<MemoryStore>,
    bus: Arc<EventBus>,
}

impl Harness {
    fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(MemoryStore::new(bus.clone()));
        store.seed(StoreSeed {
            objects: HashMap::from([("scene.living".to_string(), living_room())]),
            states: HashMap::new(),
        });
        let engine = SceneEngine::new(store.clone(), EngineSettings::default(), t0());
        Self { engine, store, bus }
    }

    /// Feed every queued change event to the engine, acknowledging member
    /// requests the way a device would, until the feed is quiet
    fn drain(&mut self, rx: &mut tokio::sync::broadcast::Receiver<Event<Value>>) -> usize {
        let mut handled = 0;
        loop {
            while let Ok(event) = rx.try_recv() {
                self.engine.on_event(&event);
                handled += 1;
            }

            let mut confirmed = false;
            for device in DEVICES {
                if let Some(state) = self.store.get_state(device).unwrap() {
                    if !state.ack {
                        self.store.set_state(device, state.val, true).unwrap();
                        confirmed = true;
                    }
                }
            }
            if !confirmed {
                return handled;
            }
        }
    }

    fn scene_value(&self) -> Option<Value> {
        self.store
            .get_state("scene.living")
            .unwrap()
            .map(|state| state.val)
    }
}

#[test]
fn test_request_drives_devices_and_scene_value() {
    let mut h = Harness::new();
    let mut rx = h.bus.subscribe_all();
    h.engine.start().unwrap();

    h.engine.advance_to(at(200));
    assert_eq!(h.scene_value(), Some(json!("uncertain")));

    h.store.set_state("scene.living", json!(true), false).unwrap();
    assert!(h.drain(&mut rx) > 0);

    assert_eq!(
        h.store.get_state("hue.0.lamp.level").unwrap().unwrap().val,
        json!(80)
    );
    assert_eq!(h.scene_value(), Some(json!(true)));

    h.engine.advance_to(at(1000));
    assert_eq!(h.scene_value(), Some(json!(true)));
    assert!(h.store.get_state("scene.living").unwrap().unwrap().ack);
}

#[test]
fn test_device_change_is_reflected_in_scene_value() {
    let mut h = Harness::new();
    let mut rx = h.bus.subscribe_all();
    h.engine.start().unwrap();

    h.store.set_state("scene.living", json!(true), false).unwrap();
    h.drain(&mut rx);
    h.engine.advance_to(at(500));

    h.engine.advance_to(at(1000));
    h.store.set_state("hue.0.lamp.level", json!(0), true).unwrap();
    h.drain(&mut rx);
    h.engine.advance_to(at(1200));
    assert_eq!(h.scene_value(), Some(json!("uncertain")));

    h.store.set_state("hue.0.lamp.on", json!(false), true).unwrap();
    h.drain(&mut rx);
    h.engine.advance_to(at(1400));
    assert_eq!(h.scene_value(), Some(json!(false)));
}

#[test]
fn test_capture_reloads_definition() {
    let mut h = Harness::new();
    let mut rx = h.bus.subscribe_all();
    h.store.seed(StoreSeed {
        objects: HashMap::new(),
        states: HashMap::from([
            (
                "hue.0.lamp.on".to_string(),
                scene_core::PointState::new(true, true),
            ),
            (
                "hue.0.lamp.level".to_string(),
                scene_core::PointState::new(35, true),
            ),
        ]),
    });
    h.engine.start().unwrap();

    let reply = h.engine.handle_command(
        "save",
        &json!({"sceneId": "scene.living", "isForTrue": true}),
    );
    assert_eq!(reply, Some(json!({"error": null})));

    h.drain(&mut rx);
    let scene = h.engine.scene("scene.living").unwrap();
    assert_eq!(scene.members[1].set_if_true, json!(35));
    assert_eq!(scene.members[1].set_if_false, json!(0));
}

#[test]
fn test_deleting_definition_unloads_scene() {
    let mut h = Harness::new();
    let mut rx = h.bus.subscribe_all();
    h.engine.start().unwrap();
    assert!(h.engine.scene("scene.living").is_some());

    h.store.delete_object("scene.living");
    h.drain(&mut rx);

    assert!(h.engine.registry().is_empty());
    assert!(h.store.state_subscriptions().is_empty());
}
