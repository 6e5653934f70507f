//! Cron-driven re-activation of scene sides

use chrono::{DateTime, Local, Utc};
use scene_store::PointStore;
use tracing::{debug, error, warn};

use crate::cron::{CronSchedule, ScheduleError};
use crate::engine::{CronJob, SceneEngine};
use crate::timer::{TaskId, TaskKind};

impl<S: PointStore> SceneEngine<S> {
    /// Register cron jobs for every enabled side with an expression
    ///
    /// Invalid expressions are logged and returned; that side has no job.
    pub(crate) fn register_cron_jobs(&mut self) -> Vec<(String, ScheduleError)> {
        let mut requests = Vec::new();
        for scene in self.registry.scenes() {
            for on_true in [true, false] {
                if let Some(cron) = scene.side(on_true).and_then(|s| s.cron.clone()) {
                    requests.push((scene.id.clone(), on_true, cron));
                }
            }
        }

        let mut errors = Vec::new();
        for (scene_id, on_true, expression) in requests {
            let schedule = match CronSchedule::parse(&expression) {
                Ok(schedule) => schedule,
                Err(e) => {
                    error!(scene_id = %scene_id, on_true, cron = %expression, error = %e, "Invalid cron expression");
                    errors.push((scene_id, e));
                    continue;
                }
            };

            debug!(scene_id = %scene_id, on_true, cron = %expression, "Registering cron job");
            let task = self.schedule_cron(&scene_id, on_true, &schedule);
            self.cron_jobs.entry(scene_id).or_default().push(CronJob {
                on_true,
                schedule,
                task,
            });
        }
        errors
    }

    fn schedule_cron(
        &mut self,
        scene_id: &str,
        on_true: bool,
        schedule: &CronSchedule,
    ) -> Option<TaskId> {
        let local_now: DateTime<Local> = self.now.with_timezone(&Local);
        let Some(next) = schedule.next_after(&local_now) else {
            warn!(scene_id = %scene_id, cron = %schedule, "Cron expression never fires");
            return None;
        };

        let fire_at: DateTime<Utc> = next.with_timezone(&Utc);
        Some(self.timers.schedule(
            fire_at,
            TaskKind::Cron {
                scene_id: scene_id.to_string(),
                on_true,
            },
        ))
    }

    pub(crate) fn run_cron(&mut self, scene_id: &str, on_true: bool) {
        debug!(scene_id = %scene_id, on_true, "Cron job due");
        if let Err(e) = self.activate_side(scene_id, on_true) {
            warn!(scene_id = %scene_id, error = %e, "Cron activation failed");
        }

        let Some(schedule) = self
            .cron_jobs
            .get(scene_id)
            .and_then(|jobs| jobs.iter().find(|j| j.on_true == on_true))
            .map(|j| j.schedule.clone())
        else {
            return;
        };

        let task = self.schedule_cron(scene_id, on_true, &schedule);
        if let Some(job) = self
            .cron_jobs
            .get_mut(scene_id)
            .and_then(|jobs| jobs.iter_mut().find(|j| j.on_true == on_true))
        {
            job.task = task;
        }
    }

    /// Cron expressions registered for a scene, true side first
    pub fn cron_jobs(&self, scene_id: &str) -> Vec<(bool, String)> {
        self.cron_jobs
            .get(scene_id)
            .map(|jobs| {
                jobs.iter()
                    .map(|j| (j.on_true, j.schedule.expression().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// When the cron job of one side fires next
    pub fn next_cron_run(&self, scene_id: &str, on_true: bool) -> Option<DateTime<Utc>> {
        self.cron_jobs
            .get(scene_id)?
            .iter()
            .find(|j| j.on_true == on_true)?
            .task
            .and_then(|task| self.timers.fire_time(task))
    }
}
