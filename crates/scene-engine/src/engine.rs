//! The scene engine
//!
//! [`SceneEngine`] owns the registry, the timer queue and all per-scene and
//! per-point timer bookkeeping. It is driven from a single task: external
//! updates come in through the dispatcher methods and time moves forward
//! only through [`SceneEngine::advance_to`].

use chrono::{DateTime, Duration, Utc};
use scene_config::EngineSettings;
use scene_store::{PointStore, KIND_STATE};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::cron::{CronSchedule, ScheduleError};
use crate::error::SceneResult;
use crate::registry::{Registry, SubscriptionPlan};
use crate::scene::Scene;
use crate::timer::{TaskId, TaskKind, TimerQueue};

/// A debounced scene check waiting in the timer queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingCheck {
    pub task: TaskId,
    /// When the first update of the current burst armed the check
    pub first_armed: DateTime<Utc>,
}

/// A delayed member write waiting in the timer queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingDelay {
    pub seq: u64,
    pub task: TaskId,
}

/// A registered cron job for one side of a scene
#[derive(Debug, Clone)]
pub(crate) struct CronJob {
    pub on_true: bool,
    pub schedule: CronSchedule,
    pub task: Option<TaskId>,
}

/// Scene engine over a point store
pub struct SceneEngine<S: PointStore> {
    pub(crate) store: Arc<S>,
    pub(crate) settings: EngineSettings,
    pub(crate) registry: Registry,
    pub(crate) timers: TimerQueue,
    /// Pending debounced check per scene
    pub(crate) check_timers: HashMap<String, PendingCheck>,
    /// Pending delayed writes per member point, in sequence order
    pub(crate) pending_delays: HashMap<String, Vec<PendingDelay>>,
    pub(crate) next_seq: u64,
    /// Cron jobs per scene
    pub(crate) cron_jobs: HashMap<String, Vec<CronJob>>,
    /// Cron expressions rejected by the last load
    schedule_errors: Vec<(String, ScheduleError)>,
    pub(crate) now: DateTime<Utc>,
    started: bool,
}

impl<S: PointStore> SceneEngine<S> {
    /// Create an engine whose clock starts at `now`
    ///
    /// Nothing is loaded until [`start`](Self::start) is called.
    pub fn new(store: Arc<S>, settings: EngineSettings, now: DateTime<Utc>) -> Self {
        Self {
            store,
            settings,
            registry: Registry::default(),
            timers: TimerQueue::new(),
            check_timers: HashMap::new(),
            pending_delays: HashMap::new(),
            next_seq: 1,
            cron_jobs: HashMap::new(),
            schedule_errors: Vec::new(),
            now,
            started: false,
        }
    }

    /// Subscribe to scene definition changes and load all scenes
    pub fn start(&mut self) -> SceneResult<()> {
        let pattern = self.settings.scene_pattern();
        if let Err(e) = self.store.subscribe_objects(&pattern) {
            error!(pattern = %pattern, error = %e, "Failed to subscribe to scene definitions");
        }
        self.started = true;
        self.load()
    }

    /// Tear everything down and load all scenes again
    #[instrument(skip(self))]
    pub fn reload(&mut self) -> SceneResult<()> {
        info!("Reloading scenes");
        self.teardown();
        self.load()
    }

    /// Cancel all timers and cron jobs and drop subscriptions
    pub fn shutdown(&mut self) {
        if self.started {
            info!("Stopping scene engine");
        }
        self.teardown();
        self.started = false;
    }

    fn teardown(&mut self) {
        let cancelled = self.timers.clear();
        debug!(cancelled, "Cancelled pending timers");

        self.check_timers.clear();
        self.pending_delays.clear();
        self.cron_jobs.clear();
        self.schedule_errors.clear();
        self.next_seq = 1;

        let result = match self.registry.plan() {
            SubscriptionPlan::None => Ok(()),
            SubscriptionPlan::All => self.store.unsubscribe_all_states(),
            SubscriptionPlan::Points(points) => {
                let mut result = self.store.unsubscribe_states(&self.settings.scene_pattern());
                for point in points {
                    if let Err(e) = self.store.unsubscribe_states(point) {
                        result = Err(e);
                    }
                }
                result
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to drop point subscriptions");
        }

        self.registry = Registry::default();
    }

    fn load(&mut self) -> SceneResult<()> {
        let objects = self
            .store
            .list_objects(&self.settings.scene_prefix, KIND_STATE)?;
        self.registry = Registry::build(objects, &self.settings);
        info!(scenes = self.registry.len(), "Loaded scenes");

        self.apply_subscriptions();
        self.schedule_errors = self.register_cron_jobs();
        if !self.schedule_errors.is_empty() {
            warn!(
                count = self.schedule_errors.len(),
                "Some cron jobs were not registered"
            );
        }
        self.read_initial_values();
        Ok(())
    }

    fn apply_subscriptions(&self) {
        match self.registry.plan() {
            SubscriptionPlan::None => {}
            SubscriptionPlan::All => {
                debug!("Subscribing to all points");
                if let Err(e) = self.store.subscribe_states("*") {
                    error!(error = %e, "Failed to subscribe to all points");
                }
            }
            SubscriptionPlan::Points(points) => {
                let pattern = self.settings.scene_pattern();
                if let Err(e) = self.store.subscribe_states(&pattern) {
                    error!(pattern = %pattern, error = %e, "Failed to subscribe to scene points");
                }
                for point in points {
                    debug!(point_id = %point, "Subscribing to point");
                    if let Err(e) = self.store.subscribe_states(point) {
                        error!(point_id = %point, error = %e, "Failed to subscribe to point");
                    }
                }
            }
        }
    }

    fn read_initial_values(&mut self) {
        let store = Arc::clone(&self.store);
        let mut ready = Vec::new();

        for scene in self.registry.scenes_mut() {
            scene.pending_reads = scene.members.len();
            for member in scene.members.iter_mut() {
                member.actual = match store.get_state(&member.id) {
                    Ok(Some(state)) => state.val,
                    Ok(None) => Value::Null,
                    Err(e) => {
                        error!(scene_id = %scene.id, point_id = %member.id, error = %e, "Failed to read member");
                        Value::Null
                    }
                };
                scene.pending_reads -= 1;
            }
            if scene.pending_reads == 0 {
                ready.push(scene.id.clone());
            }
        }

        for scene_id in ready {
            self.arm_check(&scene_id);
        }
    }

    /// Run every task due at or before `now`, then move the clock to `now`
    ///
    /// Tasks run in firing order with the clock set to each task's firing
    /// time, so follow-up tasks they schedule are timed correctly. Returns
    /// the number of tasks run.
    pub fn advance_to(&mut self, now: DateTime<Utc>) -> usize {
        let mut fired = 0;
        while let Some(task) = self.timers.pop_due(now) {
            if task.fire_at > self.now {
                self.now = task.fire_at;
            }
            self.run_task(task.kind);
            fired += 1;
        }
        if now > self.now {
            self.now = now;
        }
        fired
    }

    fn run_task(&mut self, kind: TaskKind) {
        match kind {
            TaskKind::Check { scene_id } => self.run_check(&scene_id),
            TaskKind::DelayedWrite {
                scene_id,
                point_id,
                seq,
                value,
            } => self.run_delayed_write(&scene_id, &point_id, seq, value),
            TaskKind::Burst {
                scene_id,
                index,
                value,
            } => self.run_burst_step(&scene_id, index, value),
            TaskKind::Cron { scene_id, on_true } => self.run_cron(&scene_id, on_true),
        }
    }

    /// When the next pending task fires
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    /// The engine clock
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// `millis` after the engine clock, saturating at the latest
    /// representable instant
    pub(crate) fn after_millis(&self, millis: u64) -> DateTime<Utc> {
        i64::try_from(millis)
            .ok()
            .and_then(Duration::try_milliseconds)
            .and_then(|offset| self.now.checked_add_signed(offset))
            .unwrap_or_else(|| {
                warn!(millis, "Timer offset out of range, scheduling at the end of time");
                DateTime::<Utc>::MAX_UTC
            })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scene(&self, scene_id: &str) -> Option<&Scene> {
        self.registry.get(scene_id)
    }

    /// Cron expressions rejected when the scenes were last loaded
    pub fn schedule_errors(&self) -> &[(String, ScheduleError)] {
        &self.schedule_errors
    }

    /// Number of tasks waiting in the timer queue
    pub fn pending_tasks(&self) -> usize {
        self.timers.len()
    }

    /// Sequence tags of delayed writes pending for a point
    pub fn pending_delays(&self, point_id: &str) -> Vec<u64> {
        self.pending_delays
            .get(point_id)
            .map(|list| list.iter().map(|d| d.seq).collect())
            .unwrap_or_default()
    }

    /// Whether a debounced check is pending for a scene
    pub fn check_pending(&self, scene_id: &str) -> bool {
        self.check_timers.contains_key(scene_id)
    }

    /// Write a point value as a request (not acknowledged)
    pub(crate) fn write_point(&self, point_id: &str, value: Value) {
        debug!(point_id = %point_id, value = %value, "Writing member");
        if let Err(e) = self.store.set_state(point_id, value, false) {
            error!(point_id = %point_id, error = %e, "Failed to write member");
        }
    }

    /// Publish a scene value unless the cached value is already acknowledged
    /// and identical
    pub(crate) fn publish(&mut self, scene_id: &str, value: Value) {
        let Some(scene) = self.registry.get_mut(scene_id) else {
            return;
        };
        if scene.value.val == value && scene.value.ack {
            return;
        }

        debug!(scene_id = %scene_id, value = %value, "Publishing scene value");
        scene.value.val = value.clone();
        scene.value.ack = true;
        if let Err(e) = self.store.set_state(scene_id, value, true) {
            error!(scene_id = %scene_id, error = %e, "Failed to publish scene value");
        }
    }
}
