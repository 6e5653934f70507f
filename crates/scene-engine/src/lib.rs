//! Scene Engine
//!
//! Scenes are named state machines over a set of member points. The engine
//! decides when a scene is activated, writes its targets to the members
//! and derives the scene's own published value from what the members
//! report back.
//!
//! # Architecture
//!
//! ```text
//! change feed ──► dispatcher ──► aggregator (debounced) ──► publish
//!                     │
//!                     └──► triggers ──► activation ──► member writes
//!                                            ▲
//!                               cron jobs ───┘
//! ```
//!
//! All timing (debounce, member delays, burst staggering, cron) runs on a
//! single [`TimerQueue`] advanced explicitly with
//! [`SceneEngine::advance_to`].
//!
//! # Key Types
//!
//! - [`SceneEngine`] - Owns the registry and all timers
//! - [`Registry`] - Loaded scenes and point indices
//! - [`Scene`] - Normalized scene model
//! - [`Trigger`] - Condition on one point
//! - [`CronSchedule`] - Parsed cron expression

mod activation;
pub mod aggregator;
mod capture;
pub mod cron;
mod dispatcher;
mod engine;
mod error;
pub mod registry;
pub mod scene;
mod scheduler;
pub mod timer;
pub mod trigger;

pub use aggregator::aggregate;
pub use capture::{CaptureRequest, COMMAND_SAVE};
pub use cron::{CronSchedule, ScheduleError, ScheduleResult};
pub use engine::SceneEngine;
pub use error::{SceneError, SceneResult};
pub use registry::{Registry, SubscriptionPlan};
pub use scene::{Member, Scene, SceneDefinition, SceneValue, Side};
pub use timer::{TaskId, TaskKind, TimerQueue};
pub use trigger::{Trigger, TriggerCondition};
