//! Core types for the scene engine
//!
//! This crate provides the fundamental types shared by the store, the event
//! bus and the engine: the observed state of a point, the change-feed event
//! envelope, and the loose value semantics used when comparing observed
//! values against scene targets.

mod event;
mod state;
pub mod value;

pub use event::{Event, EventData, EventType};
pub use state::PointState;
pub use value::{is_truthy, loose_eq, parse_canonical, parse_finite, value_to_string};

/// Sentinel published by a scene whose members agree with neither side
pub const VALUE_UNCERTAIN: &str = "uncertain";

/// Standard event types carried on the change feed
pub mod events {
    use super::*;

    /// Event type for point value changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Event type for object (definition) changes
    pub const OBJECT_CHANGED: &str = "object_changed";

    /// Data for STATE_CHANGED events
    ///
    /// `state` is `None` when the point was deleted.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub id: String,
        pub state: Option<PointState>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for OBJECT_CHANGED events
    ///
    /// `object` is `None` when the object was deleted.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct ObjectChangedData {
        pub id: String,
        pub object: Option<serde_json::Value>,
    }

    impl EventData for ObjectChangedData {
        fn event_type() -> &'static str {
            OBJECT_CHANGED
        }
    }
}
