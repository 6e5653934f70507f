//! Point and object store for the scene engine
//!
//! The engine treats the store as an external collaborator: it owns the
//! current values of all points, the scene definitions (objects), and the
//! change feed. This crate defines that boundary as the [`PointStore`]
//! trait and ships [`MemoryStore`], an in-memory implementation that fires
//! change events on an [`EventBus`](scene_event_bus::EventBus).

mod error;
mod memory;
mod pattern;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, StoreSeed};
pub use pattern::Pattern;

use scene_core::PointState;
use serde_json::Value;

/// Object kind listed when loading scene definitions
pub const KIND_STATE: &str = "state";

/// Operations the engine needs from the external store
///
/// Writes are fire-and-forget from the engine's point of view: an error is
/// reported to the caller, which logs it and does not retry.
pub trait PointStore: Send + Sync {
    /// Read the current state of a point
    fn get_state(&self, id: &str) -> StoreResult<Option<PointState>>;

    /// Write a point value
    ///
    /// `ack = true` marks the write as a confirmed (published) value rather
    /// than a request to change the point.
    fn set_state(&self, id: &str, val: Value, ack: bool) -> StoreResult<()>;

    /// Read an object (definition)
    fn get_object(&self, id: &str) -> StoreResult<Option<Value>>;

    /// Create or replace an object
    fn set_object(&self, id: &str, object: Value) -> StoreResult<()>;

    /// List objects whose id starts with `prefix` and whose `type` is `kind`
    ///
    /// Results are ordered by id.
    fn list_objects(&self, prefix: &str, kind: &str) -> StoreResult<Vec<(String, Value)>>;

    /// Receive change events for points matching `pattern` (`*` wildcard)
    fn subscribe_states(&self, pattern: &str) -> StoreResult<()>;

    /// Stop receiving change events for `pattern`
    fn unsubscribe_states(&self, pattern: &str) -> StoreResult<()>;

    /// Drop every point subscription
    fn unsubscribe_all_states(&self) -> StoreResult<()>;

    /// Receive change events for objects matching `pattern`
    fn subscribe_objects(&self, pattern: &str) -> StoreResult<()>;
}
