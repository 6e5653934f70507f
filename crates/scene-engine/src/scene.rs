//! Scene definitions and the runtime scene model
//!
//! Definitions live in the object store as `state` objects:
//!
//! ```json
//! {
//!   "type": "state",
//!   "common": { "name": "Evening", "enabled": true, "engine": "system.adapter.scenes.0" },
//!   "native": {
//!     "burstInterval": 0,
//!     "virtualGroup": false,
//!     "members": [
//!       { "id": "hm.0.light", "setIfTrue": true, "setIfFalse": false, "delay": 0, "stopAllDelays": false }
//!     ],
//!     "onTrue":  { "trigger": { "id": "hm.0.button", "condition": "==", "value": "true" }, "cron": "" },
//!     "onFalse": { "enabled": false, "trigger": null, "cron": "" }
//!   }
//! }
//! ```
//!
//! [`SceneDefinition`] is the tolerant serde view of such an object.
//! [`Scene`] is the normalized model the engine works with.

use scene_core::value_to_string;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{error, warn};

use crate::error::{SceneError, SceneResult};
use crate::trigger::{Trigger, TriggerCondition};

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|v| scene_core::is_truthy(&v)).unwrap_or(false))
}

/// Longest delay or burst interval accepted, in milliseconds
pub const MAX_DELAY_MS: u64 = i32::MAX as u64;

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(text_of))
}

/// An optional nested section; one that does not parse is dropped
fn lenient_section<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(value) = Option::<Value>::deserialize(deserializer)?.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    match serde_json::from_value(value.clone()) {
        Ok(section) => Ok(Some(section)),
        Err(e) => {
            warn!(section = %value, error = %e, "Ignoring malformed scene section");
            Ok(None)
        }
    }
}

/// Member entries, skipping those that are not objects
fn lenient_members<'de, D>(deserializer: D) -> Result<Vec<MemberDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Option::<Value>::deserialize(deserializer)? {
        None => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            warn!(members = %other, "Scene members are not a list, ignoring them");
            return Ok(Vec::new());
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<MemberDefinition>(entry.clone()) {
            Ok(member) => Some(member),
            Err(e) => {
                warn!(member = %entry, error = %e, "Ignoring malformed scene member");
                None
            }
        })
        .collect())
}

/// String form of a loosely typed field
///
/// Translated names (`{"en": "Evening", "de": "Abend"}`) yield the English
/// entry, or the first string entry when there is none.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value_to_string(value)),
        Value::Object(map) => map
            .get("en")
            .and_then(Value::as_str)
            .or_else(|| map.values().find_map(Value::as_str))
            .map(str::to_string),
    }
}

/// The `common` section of a scene object
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonSection {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "null_as_false")]
    pub enabled: bool,

    /// Authority of the engine instance owning the scene
    #[serde(default, deserialize_with = "lenient_text")]
    pub engine: Option<String>,
}

/// One member entry as stored
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDefinition {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,

    #[serde(default)]
    pub set_if_true: Value,

    #[serde(default)]
    pub set_if_false: Value,

    /// Milliseconds, as a number or numeric string
    #[serde(default)]
    pub delay: Value,

    #[serde(default, deserialize_with = "null_as_false")]
    pub stop_all_delays: bool,

    #[serde(default, deserialize_with = "null_as_false")]
    pub disabled: bool,
}

/// Trigger entry as stored
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDefinition {
    #[serde(default, alias = "pointId", deserialize_with = "lenient_text")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub condition: Option<String>,

    #[serde(default)]
    pub value: Value,
}

/// `onTrue` / `onFalse` entry as stored
///
/// Older definitions carry the trigger flat as `triggerId`, `triggerCond`
/// and `triggerValue`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideDefinition {
    #[serde(default)]
    pub enabled: Option<Value>,

    #[serde(default, deserialize_with = "lenient_section")]
    pub trigger: Option<TriggerDefinition>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub trigger_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub trigger_cond: Option<String>,

    #[serde(default)]
    pub trigger_value: Value,

    #[serde(default, deserialize_with = "lenient_text")]
    pub cron: Option<String>,
}

/// The `native` section of a scene object
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeSection {
    #[serde(default, alias = "burstIntervall")]
    pub burst_interval: Value,

    #[serde(default, deserialize_with = "null_as_false")]
    pub virtual_group: bool,

    #[serde(default, deserialize_with = "lenient_members")]
    pub members: Vec<MemberDefinition>,

    #[serde(default, deserialize_with = "lenient_section")]
    pub on_true: Option<SideDefinition>,

    #[serde(default, deserialize_with = "lenient_section")]
    pub on_false: Option<SideDefinition>,
}

/// A scene object as read from the store
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneDefinition {
    #[serde(default)]
    pub common: CommonSection,

    #[serde(default)]
    pub native: NativeSection,
}

impl SceneDefinition {
    /// Parse a stored object
    pub fn from_object(scene_id: &str, object: &Value) -> SceneResult<Self> {
        serde_json::from_value(object.clone()).map_err(|e| SceneError::InvalidDefinition {
            scene_id: scene_id.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Published value of a scene as cached by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct SceneValue {
    pub val: Value,
    pub ack: bool,
}

impl Default for SceneValue {
    fn default() -> Self {
        Self {
            val: Value::Null,
            ack: true,
        }
    }
}

/// A member point of a scene
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: String,
    pub set_if_true: Value,
    pub set_if_false: Value,
    /// Milliseconds before the target is written; 0 writes immediately
    pub delay: u64,
    pub stop_all_delays: bool,
    /// Last observed value of the point
    pub actual: Value,
}

impl Member {
    /// Target for an activation with `value`
    ///
    /// Virtual groups write the activation value itself.
    pub fn target(&self, virtual_group: bool, value: &Value) -> Value {
        if virtual_group {
            value.clone()
        } else if scene_core::is_truthy(value) {
            self.set_if_true.clone()
        } else {
            self.set_if_false.clone()
        }
    }
}

/// One side (`onTrue` / `onFalse`) of a scene
#[derive(Debug, Clone, PartialEq)]
pub struct Side {
    /// Truthy `enabled`, defaulting to true for `onTrue` only; an enabled
    /// `onFalse` makes the scene bistable
    pub enabled: bool,
    /// Trigger and cron are registered unless `enabled` is literally `false`
    pub active: bool,
    pub trigger: Option<Trigger>,
    pub cron: Option<String>,
}

/// A loaded scene
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub virtual_group: bool,
    /// Milliseconds between member writes; 0 writes all at once
    pub burst_interval: u64,
    pub members: Vec<Member>,
    pub on_true: Option<Side>,
    pub on_false: Option<Side>,
    pub value: SceneValue,
    /// Initial member reads still outstanding
    pub pending_reads: usize,
}

impl Scene {
    /// Build the runtime model from a definition
    ///
    /// Disabled members and members without an id are dropped, missing
    /// targets become `false`, malformed delays are logged and treated as 0.
    pub fn from_definition(scene_id: &str, definition: SceneDefinition) -> Self {
        let native = definition.native;

        let members = native
            .members
            .into_iter()
            .filter(|m| !m.disabled)
            .filter_map(|m| {
                let Some(id) = m.id.filter(|id| !id.is_empty()) else {
                    warn!(scene_id = %scene_id, "Ignoring scene member without id");
                    return None;
                };
                Some(Member {
                    delay: parse_delay(scene_id, &id, &m.delay),
                    set_if_true: null_to_false(m.set_if_true),
                    set_if_false: null_to_false(m.set_if_false),
                    stop_all_delays: m.stop_all_delays,
                    actual: Value::Null,
                    id,
                })
            })
            .collect();

        Self {
            id: scene_id.to_string(),
            name: definition
                .common
                .name
                .unwrap_or_else(|| scene_id.to_string()),
            virtual_group: native.virtual_group,
            burst_interval: millis(&native.burst_interval).unwrap_or(0),
            members,
            on_true: native.on_true.map(|s| build_side(s, true)),
            on_false: native.on_false.map(|s| build_side(s, false)),
            value: SceneValue::default(),
            pending_reads: 0,
        }
    }

    /// Whether the scene is bistable (publishes `false` as well as `true`)
    pub fn on_false_enabled(&self) -> bool {
        self.on_false.as_ref().map(|s| s.enabled).unwrap_or(false)
    }

    /// The side for `on_true`, if present and active
    pub fn side(&self, on_true: bool) -> Option<&Side> {
        let side = if on_true {
            self.on_true.as_ref()
        } else {
            self.on_false.as_ref()
        };
        side.filter(|s| s.active)
    }
}

fn null_to_false(value: Value) -> Value {
    if value.is_null() {
        Value::Bool(false)
    } else {
        value
    }
}

fn millis(value: &Value) -> Option<u64> {
    let ms = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    ms.filter(|ms| *ms <= MAX_DELAY_MS)
}

fn parse_delay(scene_id: &str, point_id: &str, raw: &Value) -> u64 {
    let delay = match raw {
        Value::Null | Value::Bool(false) => Some(0),
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.is_empty() => Some(0),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    }
    .filter(|ms| *ms <= MAX_DELAY_MS);

    delay.unwrap_or_else(|| {
        error!(
            scene_id = %scene_id,
            point_id = %point_id,
            delay = %raw,
            "Invalid delay for scene member, using 0"
        );
        0
    })
}

fn build_side(definition: SideDefinition, on_true: bool) -> Side {
    let enabled = match &definition.enabled {
        Some(value) if !value.is_null() => scene_core::is_truthy(value),
        _ => on_true,
    };
    let active = definition.enabled != Some(Value::Bool(false));

    let trigger = match definition.trigger {
        Some(t) => build_trigger(t.id, t.condition, &t.value),
        None => build_trigger(
            definition.trigger_id,
            definition.trigger_cond,
            &definition.trigger_value,
        ),
    };

    Side {
        enabled,
        active,
        trigger,
        cron: definition
            .cron
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
    }
}

fn build_trigger(id: Option<String>, condition: Option<String>, value: &Value) -> Option<Trigger> {
    let id = id.filter(|id| !id.is_empty())?;
    Some(Trigger {
        point_id: id,
        condition: TriggerCondition::from(condition.unwrap_or_default()),
        value: value_to_string(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(object: Value) -> Scene {
        let definition = SceneDefinition::from_object("scene.test", &object).unwrap();
        Scene::from_definition("scene.test", definition)
    }

    #[test]
    fn test_full_definition() {
        let scene = build(json!({
            "type": "state",
            "common": {"name": "Evening", "enabled": true, "engine": "system.adapter.scenes.0"},
            "native": {
                "burstIntervall": 250,
                "members": [
                    {"id": "hm.0.light", "setIfTrue": true, "setIfFalse": null, "delay": "1500", "stopAllDelays": true},
                    {"id": "hm.0.dimmer", "setIfTrue": 80, "disabled": true},
                    {"id": "hm.0.blind", "setIfTrue": 0, "setIfFalse": 100}
                ],
                "onTrue": {"trigger": {"id": "hm.0.button", "condition": ">=", "value": 5}, "cron": "0 7 * * *"},
                "onFalse": {"enabled": true, "trigger": {"id": "hm.0.button", "condition": "==", "value": null}, "cron": ""}
            }
        }));

        assert_eq!(scene.name, "Evening");
        assert_eq!(scene.burst_interval, 250);
        assert_eq!(scene.members.len(), 2);

        let light = &scene.members[0];
        assert_eq!(light.delay, 1500);
        assert!(light.stop_all_delays);
        assert_eq!(light.set_if_false, json!(false));
        assert_eq!(light.actual, Value::Null);

        let on_true = scene.side(true).unwrap();
        assert_eq!(
            on_true.trigger,
            Some(Trigger::new("hm.0.button", ">=", "5"))
        );
        assert_eq!(on_true.cron.as_deref(), Some("0 7 * * *"));

        let on_false = scene.side(false).unwrap();
        assert_eq!(on_false.trigger.as_ref().unwrap().value, "");
        assert_eq!(on_false.cron, None);
        assert!(scene.on_false_enabled());
        assert_eq!(scene.value, SceneValue::default());
    }

    #[test]
    fn test_sides_default_enablement() {
        let scene = build(json!({
            "common": {"enabled": true},
            "native": {
                "members": [{"id": "p1", "setIfTrue": true}],
                "onTrue": {"cron": ""},
                "onFalse": {"cron": "0 22 * * *"}
            }
        }));

        // onFalse without `enabled` keeps its cron but stays monostable
        assert!(scene.side(true).is_some());
        let on_false = scene.side(false).unwrap();
        assert_eq!(on_false.cron.as_deref(), Some("0 22 * * *"));
        assert!(!on_false.enabled);
        assert!(!scene.on_false_enabled());
    }

    #[test]
    fn test_only_literal_false_deactivates_side() {
        let scene = build(json!({
            "native": {
                "members": [{"id": "p1"}],
                "onTrue": {"enabled": false, "cron": "0 7 * * *"},
                "onFalse": {"enabled": 0, "triggerId": "hm.0.button", "triggerCond": "update"}
            }
        }));

        assert!(scene.side(true).is_none());
        assert!(scene.side(false).unwrap().trigger.is_some());
        assert!(!scene.on_false_enabled());
    }

    #[test]
    fn test_translated_name_and_loose_fields() {
        let scene = build(json!({
            "common": {"name": {"en": "Evening", "de": "Abend"}, "enabled": true},
            "native": {
                "members": [
                    {"id": 42, "setIfTrue": true},
                    {"id": null, "setIfTrue": true},
                    {"id": {"nested": 1}},
                    {"id": "hm.0.light"}
                ],
                "onTrue": {"trigger": {"id": "hm.0.button", "condition": 5, "value": 1}, "cron": 7}
            }
        }));

        assert_eq!(scene.name, "Evening");
        let ids: Vec<&str> = scene.members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["42", "hm.0.light"]);

        let on_true = scene.side(true).unwrap();
        assert_eq!(
            on_true.trigger.as_ref().unwrap().condition,
            TriggerCondition::Unsupported("5".to_string())
        );
        assert_eq!(on_true.cron.as_deref(), Some("7"));

        let scene = build(json!({"common": {"name": {"de": "Abend"}}}));
        assert_eq!(scene.name, "Abend");

        let scene = build(json!({"common": {"name": ["Evening"]}}));
        assert_eq!(scene.name, "scene.test");

        let scene = build(json!({"native": {
            "members": [{"id": "p1"}],
            "onTrue": {"trigger": "", "cron": "0 7 * * *"},
            "onFalse": "off"
        }}));
        let on_true = scene.side(true).unwrap();
        assert!(on_true.trigger.is_none());
        assert_eq!(on_true.cron.as_deref(), Some("0 7 * * *"));
        assert!(scene.on_false.is_none());
    }

    #[test]
    fn test_malformed_delay_becomes_zero() {
        let scene = build(json!({
            "native": {"members": [
                {"id": "p1", "delay": "soon"},
                {"id": "p2", "delay": -5},
                {"id": "p3", "delay": 12.5},
                {"id": "p4", "delay": 300},
                {"id": "p5", "delay": "100000000000000000"},
                {"id": "p6", "delay": u64::MAX}
            ]}
        }));

        let delays: Vec<u64> = scene.members.iter().map(|m| m.delay).collect();
        assert_eq!(delays, vec![0, 0, 0, 300, 0, 0]);
    }

    #[test]
    fn test_flat_legacy_trigger() {
        let scene = build(json!({
            "native": {
                "members": [{"id": "p1"}],
                "onTrue": {"triggerId": "hm.0.motion", "triggerCond": "update", "triggerValue": null}
            }
        }));

        let trigger = scene.side(true).unwrap().trigger.clone().unwrap();
        assert_eq!(trigger.point_id, "hm.0.motion");
        assert_eq!(trigger.condition, TriggerCondition::Update);
    }

    #[test]
    fn test_member_target() {
        let member = Member {
            id: "p1".to_string(),
            set_if_true: json!(1),
            set_if_false: json!("off"),
            delay: 0,
            stop_all_delays: false,
            actual: Value::Null,
        };

        assert_eq!(member.target(false, &json!(true)), json!(1));
        assert_eq!(member.target(false, &json!("false")), json!("off"));
        assert_eq!(member.target(true, &json!(42)), json!(42));
    }

    #[test]
    fn test_malformed_members_degrade() {
        let scene = build(json!({"native": {"members": "p1"}}));
        assert!(scene.members.is_empty());

        let scene = build(json!({"native": {"members": [
            "p1",
            {"id": "p2", "stopAllDelays": true},
            null
        ]}}));
        assert_eq!(scene.members.len(), 1);
        assert_eq!(scene.members[0].id, "p2");
    }

    #[test]
    fn test_rejects_non_object_definition() {
        let object = json!("scene");
        assert!(matches!(
            SceneDefinition::from_object("scene.bad", &object),
            Err(SceneError::InvalidDefinition { .. })
        ));
    }
}
