//! Observed state of a single point

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The value of a point at a point in time
///
/// `ack` distinguishes confirmed values (written by the owner of the point,
/// or a derived value published by the engine) from requests to change it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointState {
    /// The value (bool, number, string, or null)
    #[serde(default)]
    pub val: serde_json::Value,

    /// Whether the value is acknowledged
    #[serde(default)]
    pub ack: bool,

    /// When the value was written
    #[serde(default = "Utc::now")]
    pub ts: DateTime<Utc>,

    /// Writer of the value, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl PointState {
    /// Create a new state stamped with the current time
    pub fn new(val: impl Into<serde_json::Value>, ack: bool) -> Self {
        Self {
            val: val.into(),
            ack,
            ts: Utc::now(),
            from: None,
        }
    }

    /// Set the writer of this state
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

impl PartialEq for PointState {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and writer are not compared
        self.val == other.val && self.ack == other.ack
    }
}
