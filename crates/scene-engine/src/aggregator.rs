//! Debounced aggregation of member values into the scene value

use scene_core::{loose_eq, VALUE_UNCERTAIN};
use scene_store::PointStore;
use serde_json::Value;
use tracing::{debug, trace};

use crate::engine::{PendingCheck, SceneEngine};
use crate::scene::Scene;
use crate::timer::TaskKind;

/// Derive the value a scene should publish from its members' actual values
///
/// Members with a delay are not considered. Returns `None` when the scene
/// value must stay unchanged.
pub fn aggregate(scene: &Scene) -> Option<Value> {
    let included: Vec<_> = scene.members.iter().filter(|m| m.delay == 0).collect();

    if scene.virtual_group {
        let first = &included.first()?.actual;
        if included.iter().all(|m| loose_eq(first, &m.actual)) {
            // All members unknown: nothing to report yet
            return (!first.is_null()).then(|| first.clone());
        }
        return Some(Value::String(VALUE_UNCERTAIN.to_string()));
    }

    let all_true = !included.is_empty()
        && included
            .iter()
            .all(|m| loose_eq(&m.set_if_true, &m.actual));

    if !scene.on_false_enabled() {
        // Monostable scenes only ever confirm `true`
        return all_true.then_some(Value::Bool(true));
    }

    if all_true {
        return Some(Value::Bool(true));
    }

    let all_false = !included.is_empty()
        && included
            .iter()
            .all(|m| loose_eq(&m.set_if_false, &m.actual));
    if all_false {
        Some(Value::Bool(false))
    } else {
        Some(Value::String(VALUE_UNCERTAIN.to_string()))
    }
}

impl<S: PointStore> SceneEngine<S> {
    /// Record a member update and (re)arm the scene's debounced check
    pub(crate) fn record_member_update(&mut self, scene_id: &str, point_id: &str, val: &Value) {
        let Some(scene) = self.registry.get_mut(scene_id) else {
            return;
        };
        for member in scene.members.iter_mut().filter(|m| m.id == point_id) {
            member.actual = val.clone();
        }
        if scene.pending_reads > 0 {
            trace!(scene_id = %scene_id, "Initial reads outstanding, not checking yet");
            return;
        }
        self.arm_check(scene_id);
    }

    /// Schedule the scene's check one debounce window from now
    ///
    /// A check that is already pending is pushed back, so a burst of
    /// updates results in a single check after the last one. It is never
    /// pushed past `debounce_max_wait_ms` after the first update of the
    /// burst.
    pub(crate) fn arm_check(&mut self, scene_id: &str) {
        let first_armed = match self.check_timers.remove(scene_id) {
            Some(pending) => {
                self.timers.cancel(pending.task);
                pending.first_armed
            }
            None => self.now,
        };

        let waited = u64::try_from((self.now - first_armed).num_milliseconds()).unwrap_or(0);
        let remaining = self.settings.debounce_max_wait_ms.saturating_sub(waited);
        let fire_at = self.after_millis(self.settings.debounce_ms.min(remaining));
        trace!(scene_id = %scene_id, fire_at = %fire_at, "Arming scene check");

        let task = self.timers.schedule(
            fire_at,
            TaskKind::Check {
                scene_id: scene_id.to_string(),
            },
        );
        self.check_timers
            .insert(scene_id.to_string(), PendingCheck { task, first_armed });
    }

    pub(crate) fn run_check(&mut self, scene_id: &str) {
        self.check_timers.remove(scene_id);
        let Some(scene) = self.registry.get(scene_id) else {
            return;
        };

        match aggregate(scene) {
            Some(value) => {
                debug!(scene_id = %scene_id, value = %value, "Scene check");
                self.publish(scene_id, value);
            }
            None => trace!(scene_id = %scene_id, "Scene check left value unchanged"),
        }
    }
}
