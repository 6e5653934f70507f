//! Scheduled tasks driven by an explicit clock
//!
//! All time-based behavior of the engine (debounced checks, delayed member
//! writes, staggered bursts, cron re-activation) is expressed as tasks in a
//! single [`TimerQueue`]. The queue never looks at the wall clock: the owner
//! pops due tasks for a given instant, so tests advance virtual time.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Handle of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What a task does when it fires
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    /// Re-aggregate a scene after the debounce window
    Check { scene_id: String },

    /// Write a member target after its delay
    DelayedWrite {
        scene_id: String,
        point_id: String,
        seq: u64,
        value: Value,
    },

    /// Apply the next member of a staggered activation
    Burst {
        scene_id: String,
        index: usize,
        value: Value,
    },

    /// Re-activate one side of a scene on its cron schedule
    Cron { scene_id: String, on_true: bool },
}

impl TaskKind {
    /// Scene the task belongs to
    pub fn scene_id(&self) -> &str {
        match self {
            TaskKind::Check { scene_id }
            | TaskKind::DelayedWrite { scene_id, .. }
            | TaskKind::Burst { scene_id, .. }
            | TaskKind::Cron { scene_id, .. } => scene_id,
        }
    }
}

/// A task popped from the queue
#[derive(Debug, Clone, PartialEq)]
pub struct DueTask {
    pub id: TaskId,
    pub fire_at: DateTime<Utc>,
    pub kind: TaskKind,
}

/// Ordered queue of one-shot tasks
///
/// Tasks due at the same instant fire in scheduling order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    queue: BTreeMap<(DateTime<Utc>, TaskId), TaskKind>,
    index: HashMap<TaskId, DateTime<Utc>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a task to fire at `fire_at`
    pub fn schedule(&mut self, fire_at: DateTime<Utc>, kind: TaskKind) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.queue.insert((fire_at, id), kind);
        self.index.insert(id, fire_at);
        id
    }

    /// Cancel a task, returning it if it was still pending
    pub fn cancel(&mut self, id: TaskId) -> Option<TaskKind> {
        let fire_at = self.index.remove(&id)?;
        self.queue.remove(&(fire_at, id))
    }

    /// Remove and return the earliest task due at or before `now`
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<DueTask> {
        let (&(fire_at, id), _) = self.queue.iter().next()?;
        if fire_at > now {
            return None;
        }
        let kind = self.queue.remove(&(fire_at, id))?;
        self.index.remove(&id);
        Some(DueTask { id, fire_at, kind })
    }

    /// When the earliest pending task fires
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(fire_at, _)| *fire_at)
    }

    /// When a pending task fires
    pub fn fire_time(&self, id: TaskId) -> Option<DateTime<Utc>> {
        self.index.get(&id).copied()
    }

    /// Whether a task is still pending
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every pending task, returning how many were cancelled
    pub fn clear(&mut self) -> usize {
        let count = self.queue.len();
        self.queue.clear();
        self.index.clear();
        count
    }
}
