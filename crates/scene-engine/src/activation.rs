//! Applying a scene to its members

use scene_store::PointStore;
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::{PendingDelay, SceneEngine};
use crate::error::{SceneError, SceneResult};
use crate::timer::TaskKind;

impl<S: PointStore> SceneEngine<S> {
    /// Activate a scene with `value`
    ///
    /// Regular scenes write each member's `setIfTrue` or `setIfFalse`
    /// depending on the truthiness of `value`; virtual groups write `value`
    /// itself. With a burst interval the members are written one interval
    /// apart and the scene value is published after the last one.
    pub fn activate(&mut self, scene_id: &str, value: Value) -> SceneResult<()> {
        let scene = self
            .registry
            .get(scene_id)
            .ok_or_else(|| SceneError::not_found(scene_id))?;
        let burst_interval = scene.burst_interval;
        let member_count = scene.members.len();

        debug!(scene_id = %scene_id, value = %value, burst_interval, "Activating scene");

        if burst_interval == 0 {
            for index in 0..member_count {
                self.apply_member(scene_id, index, &value);
            }
            self.publish_activation(scene_id, value);
        } else if member_count == 0 {
            self.publish_activation(scene_id, value);
        } else {
            self.run_burst_step(scene_id, 0, value);
        }
        Ok(())
    }

    /// Activate the true or false side of a scene
    pub fn activate_side(&mut self, scene_id: &str, on_true: bool) -> SceneResult<()> {
        self.activate(scene_id, Value::Bool(on_true))
    }

    /// Apply member `index`, then schedule the next one or publish
    pub(crate) fn run_burst_step(&mut self, scene_id: &str, index: usize, value: Value) {
        let Some(scene) = self.registry.get(scene_id) else {
            return;
        };
        let burst_interval = scene.burst_interval;
        let member_count = scene.members.len();

        if index < member_count {
            self.apply_member(scene_id, index, &value);
        }

        if index + 1 < member_count {
            let fire_at = self.after_millis(burst_interval);
            self.timers.schedule(
                fire_at,
                TaskKind::Burst {
                    scene_id: scene_id.to_string(),
                    index: index + 1,
                    value,
                },
            );
        } else {
            self.publish_activation(scene_id, value);
        }
    }

    /// Write the target of one member, honoring its delay
    fn apply_member(&mut self, scene_id: &str, index: usize, value: &Value) {
        let Some(scene) = self.registry.get(scene_id) else {
            return;
        };
        let Some(member) = scene.members.get(index) else {
            return;
        };
        let target = member.target(scene.virtual_group, value);
        let point_id = member.id.clone();
        let delay = member.delay;
        let stop_all_delays = member.stop_all_delays;

        if stop_all_delays {
            self.cancel_delays(&point_id);
        }

        if delay == 0 {
            self.write_point(&point_id, target);
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let fire_at = self.after_millis(delay);
        let task = self.timers.schedule(
            fire_at,
            TaskKind::DelayedWrite {
                scene_id: scene_id.to_string(),
                point_id: point_id.clone(),
                seq,
                value: target,
            },
        );
        debug!(scene_id = %scene_id, point_id = %point_id, seq, delay, "Scheduled delayed write");
        self.pending_delays
            .entry(point_id)
            .or_default()
            .push(PendingDelay { seq, task });
    }

    /// Cancel every delayed write pending for a point
    fn cancel_delays(&mut self, point_id: &str) {
        let Some(pending) = self.pending_delays.remove(point_id) else {
            return;
        };
        if !pending.is_empty() {
            debug!(point_id = %point_id, count = pending.len(), "Cancelling delayed writes");
        }
        for delay in pending {
            self.timers.cancel(delay.task);
        }
    }

    pub(crate) fn run_delayed_write(
        &mut self,
        scene_id: &str,
        point_id: &str,
        seq: u64,
        value: Value,
    ) {
        debug!(scene_id = %scene_id, point_id = %point_id, seq, "Delayed write due");
        self.write_point(point_id, value);

        match self.pending_delays.get_mut(point_id) {
            Some(pending) => {
                pending.retain(|d| d.seq != seq);
                if pending.is_empty() {
                    self.pending_delays.remove(point_id);
                }
            }
            None => warn!(point_id = %point_id, seq, "Delayed write was not tracked"),
        }
    }

    /// Publish the scene value after an activation
    ///
    /// Bistable scenes publish the activation value, monostable scenes
    /// always publish `true`.
    fn publish_activation(&mut self, scene_id: &str, value: Value) {
        let bistable = self
            .registry
            .get(scene_id)
            .map(|s| s.on_false_enabled())
            .unwrap_or(false);
        let published = if bistable { value } else { Value::Bool(true) };
        self.publish(scene_id, published);
    }
}
