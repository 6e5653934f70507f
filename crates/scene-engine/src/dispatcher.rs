//! Entry points for the store's change feed

use scene_core::events::{ObjectChangedData, StateChangedData, OBJECT_CHANGED, STATE_CHANGED};
use scene_core::{is_truthy, Event, PointState};
use scene_store::PointStore;
use serde_json::Value;
use tracing::{debug, error, instrument, trace, warn};

use crate::engine::SceneEngine;
use crate::error::SceneResult;
use crate::scene::SceneValue;

impl<S: PointStore> SceneEngine<S> {
    /// Route one change-feed event to the matching handler
    pub fn on_event(&mut self, event: &Event<Value>) {
        match event.event_type.as_str() {
            STATE_CHANGED => match serde_json::from_value::<StateChangedData>(event.data.clone()) {
                Ok(StateChangedData {
                    id,
                    state: Some(state),
                }) => self.on_point_update(&id, &state),
                Ok(StateChangedData { id, state: None }) => {
                    trace!(point_id = %id, "Ignoring deleted point");
                }
                Err(e) => warn!(error = %e, "Malformed state change event"),
            },
            OBJECT_CHANGED => match serde_json::from_value::<ObjectChangedData>(event.data.clone()) {
                Ok(data) => {
                    if let Err(e) = self.on_definition_change(&data.id, data.object.as_ref()) {
                        error!(id = %data.id, error = %e, "Failed to reload scenes");
                    }
                }
                Err(e) => warn!(error = %e, "Malformed object change event"),
            },
            _ => {}
        }
    }

    /// Handle a new value of a subscribed point
    ///
    /// Writes to a scene's own point are cached as the scene value; a
    /// request (not acknowledged) also activates the scene. The update is
    /// then fed to every scene having the point as a member and to every
    /// trigger watching it.
    #[instrument(skip(self, state), fields(val = %state.val, ack = state.ack))]
    pub fn on_point_update(&mut self, point_id: &str, state: &PointState) {
        if let Some(scene) = self.registry.get_mut(point_id) {
            scene.value = SceneValue {
                val: state.val.clone(),
                ack: state.ack,
            };

            let virtual_group = scene.virtual_group;
            let bistable = scene.on_false_enabled();

            if !state.ack {
                let result = if virtual_group {
                    self.activate(point_id, state.val.clone())
                } else if is_truthy(&state.val) {
                    self.activate_side(point_id, true)
                } else if bistable {
                    self.activate_side(point_id, false)
                } else {
                    debug!(scene_id = %point_id, "Ignoring false request for monostable scene");
                    Ok(())
                };
                if let Err(e) = result {
                    warn!(scene_id = %point_id, error = %e, "Scene activation failed");
                }
            }
        }

        for scene_id in self.registry.scenes_for_point(point_id).to_vec() {
            self.record_member_update(&scene_id, point_id, &state.val);
        }

        for scene_id in self.registry.triggers_for_point(point_id).to_vec() {
            for on_true in [true, false] {
                self.check_trigger(&scene_id, point_id, &state.val, on_true);
            }
        }
    }

    fn check_trigger(&mut self, scene_id: &str, point_id: &str, val: &Value, on_true: bool) {
        let fires = self
            .registry
            .get(scene_id)
            .and_then(|scene| scene.side(on_true))
            .and_then(|side| side.trigger.as_ref())
            .filter(|trigger| trigger.point_id == point_id)
            .map(|trigger| trigger.evaluate(val))
            .unwrap_or(false);

        if fires {
            debug!(scene_id = %scene_id, point_id = %point_id, on_true, "Trigger fired");
            if let Err(e) = self.activate_side(scene_id, on_true) {
                warn!(scene_id = %scene_id, error = %e, "Trigger activation failed");
            }
        }
    }

    /// Handle a created, changed or deleted scene definition
    ///
    /// Reloads everything when the id is a loaded scene or the new
    /// definition belongs to this engine. Returns whether a reload ran.
    #[instrument(skip(self, object))]
    pub fn on_definition_change(&mut self, id: &str, object: Option<&Value>) -> SceneResult<bool> {
        if !id.starts_with(&self.settings.scene_prefix) {
            return Ok(false);
        }

        let authority = self.settings.authority();
        let owned = object
            .and_then(|o| o.pointer("/common/engine"))
            .and_then(Value::as_str)
            .map(|engine| engine == authority)
            .unwrap_or(false);

        if self.registry.contains(id) || owned {
            self.reload()?;
            return Ok(true);
        }

        debug!("Ignoring definition of another engine");
        Ok(false)
    }
}
