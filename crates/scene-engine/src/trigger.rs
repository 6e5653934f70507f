//! Conditional triggers
//!
//! A trigger watches one point and decides, for each observed value, whether
//! the owning side of a scene should be activated. Evaluation is pure.

use scene_core::{parse_canonical, value_to_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use tracing::{error, trace};

/// Comparison applied between the observed value and the trigger value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerCondition {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    /// Fires on every update of the point
    Update,
    /// Unknown condition kept verbatim; never fires
    Unsupported(String),
}

impl TriggerCondition {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerCondition::Eq => "==",
            TriggerCondition::Ne => "!=",
            TriggerCondition::Gt => ">",
            TriggerCondition::Lt => "<",
            TriggerCondition::Ge => ">=",
            TriggerCondition::Le => "<=",
            TriggerCondition::Update => "update",
            TriggerCondition::Unsupported(other) => other,
        }
    }
}

impl From<String> for TriggerCondition {
    fn from(s: String) -> Self {
        match s.trim() {
            "==" => TriggerCondition::Eq,
            "!=" => TriggerCondition::Ne,
            ">" => TriggerCondition::Gt,
            "<" => TriggerCondition::Lt,
            ">=" => TriggerCondition::Ge,
            "<=" => TriggerCondition::Le,
            "update" => TriggerCondition::Update,
            _ => TriggerCondition::Unsupported(s),
        }
    }
}

impl From<&str> for TriggerCondition {
    fn from(s: &str) -> Self {
        TriggerCondition::from(s.to_string())
    }
}

impl From<TriggerCondition> for String {
    fn from(condition: TriggerCondition) -> Self {
        condition.as_str().to_string()
    }
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trigger on one side of a scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Point whose updates are evaluated
    pub point_id: String,

    pub condition: TriggerCondition,

    /// Value compared against, in string form
    pub value: String,
}

impl Trigger {
    pub fn new(
        point_id: impl Into<String>,
        condition: impl Into<TriggerCondition>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            point_id: point_id.into(),
            condition: condition.into(),
            value: value.into(),
        }
    }

    /// Decide whether an observed value fires this trigger
    ///
    /// When both string forms are canonical numbers (`"10"`, not `"10.0"`)
    /// ordering conditions read as `observed <op> value` and compare as
    /// numbers. Otherwise they read as `value <op> observed` and compare the
    /// strings.
    pub fn evaluate(&self, observed: &Value) -> bool {
        let observed = value_to_string(observed);
        trace!(
            point_id = %self.point_id,
            observed = %observed,
            condition = %self.condition,
            value = %self.value,
            "Evaluating trigger"
        );

        match &self.condition {
            TriggerCondition::Eq => observed == self.value,
            TriggerCondition::Ne => observed != self.value,
            TriggerCondition::Gt => self.ordering(&observed) == Ordering::Greater,
            TriggerCondition::Lt => self.ordering(&observed) == Ordering::Less,
            TriggerCondition::Ge => self.ordering(&observed) != Ordering::Less,
            TriggerCondition::Le => self.ordering(&observed) != Ordering::Greater,
            TriggerCondition::Update => true,
            TriggerCondition::Unsupported(condition) => {
                error!(
                    point_id = %self.point_id,
                    condition = %condition,
                    "Unsupported trigger condition"
                );
                false
            }
        }
    }

    /// Left side against right side of the ordering condition
    fn ordering(&self, observed: &str) -> Ordering {
        match (parse_canonical(observed), parse_canonical(&self.value)) {
            (Some(observed), Some(value)) => {
                observed.partial_cmp(&value).unwrap_or(Ordering::Equal)
            }
            _ => self.value.as_str().cmp(observed),
        }
    }
}
