//! Capturing current member values into a scene definition

use scene_store::PointStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::engine::SceneEngine;
use crate::error::{SceneError, SceneResult};

/// Command name for capturing values
pub const COMMAND_SAVE: &str = "save";

/// Parameters of a capture command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub scene_id: String,

    /// Capture into `setIfTrue` (default) or `setIfFalse`
    #[serde(default)]
    pub is_for_true: Option<bool>,
}

impl CaptureRequest {
    /// Parse a command message, given as an object or as JSON text
    pub fn from_message(message: &Value) -> SceneResult<Self> {
        match message {
            Value::String(text) => serde_json::from_str(text).map_err(SceneError::Parse),
            other => serde_json::from_value(other.clone()).map_err(SceneError::Parse),
        }
    }

    pub fn for_true(&self) -> bool {
        self.is_for_true.unwrap_or(true)
    }
}

impl<S: PointStore> SceneEngine<S> {
    /// Copy the current value of every member into the stored definition
    ///
    /// Writes into `setIfTrue` when `is_for_true`, else `setIfFalse`, and
    /// stores the updated definition. Works on the stored object, so the
    /// scene need not be loaded by this engine. Returns the number of
    /// members captured.
    pub fn capture_values(&self, scene_id: &str, is_for_true: bool) -> SceneResult<usize> {
        debug!(scene_id = %scene_id, is_for_true, "Capturing scene values");

        let mut object = self
            .store
            .get_object(scene_id)?
            .ok_or_else(|| SceneError::not_found(scene_id))?;
        let members = object
            .pointer_mut("/native/members")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| SceneError::not_found(scene_id))?;

        let key = if is_for_true { "setIfTrue" } else { "setIfFalse" };
        let mut captured = 0;
        for member in members.iter_mut() {
            let Some(point_id) = member.get("id").and_then(Value::as_str).map(str::to_string)
            else {
                continue;
            };
            let val = match self.store.get_state(&point_id)? {
                Some(state) => state.val,
                None => {
                    warn!(scene_id = %scene_id, point_id = %point_id, "Member has no value");
                    Value::Null
                }
            };
            if let Some(fields) = member.as_object_mut() {
                fields.insert(key.to_string(), val);
                captured += 1;
            }
        }

        self.store.set_object(scene_id, object)?;
        info!(scene_id = %scene_id, captured, "Scene saved");
        Ok(captured)
    }

    /// Handle a command message and build the reply
    ///
    /// Returns `None` for unknown commands and empty messages. The reply is
    /// `{"error": null}` on success, otherwise `{"error": "<message>"}`.
    pub fn handle_command(&self, command: &str, message: &Value) -> Option<Value> {
        if command != COMMAND_SAVE {
            warn!(command = %command, "Unknown command");
            return None;
        }
        if message.is_null() {
            return None;
        }

        let result = CaptureRequest::from_message(message)
            .and_then(|request| self.capture_values(&request.scene_id, request.for_true()));

        Some(match result {
            Ok(_) => json!({ "error": null }),
            Err(e) => {
                error!(command = %command, error = %e, "Command failed");
                json!({ "error": e.to_string() })
            }
        })
    }
}
