//! Error types for the scene engine

use scene_store::StoreError;
use thiserror::Error;

/// Errors returned by engine operations
///
/// The display strings of `NotFound` and `Parse` are the replies sent back
/// to command callers.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Scene not found")]
    NotFound { scene_id: String },

    #[error("Invalid scene definition {scene_id}: {reason}")]
    InvalidDefinition { scene_id: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot parse message")]
    Parse(#[source] serde_json::Error),
}

impl SceneError {
    pub(crate) fn not_found(scene_id: impl Into<String>) -> Self {
        Self::NotFound {
            scene_id: scene_id.into(),
        }
    }
}

/// Result type for engine operations
pub type SceneResult<T> = Result<T, SceneError>;
