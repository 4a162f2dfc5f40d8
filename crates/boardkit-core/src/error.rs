//! Error types for boardkit-core
//!
//! Maps the failure taxonomy of the edit session: transient remote
//! failures are recoverable (fall back to cache on load, stay dirty on
//! flush), not-found is a renderable terminal state for the caller, and
//! cache-tier failures never escape into mutation handlers.

use thiserror::Error;

/// Core error type for board operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // Remote store
    // ===================
    #[error("Remote request failed: {message}")]
    Remote {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Remote store rejected {operation} for board {board_id}: HTTP {status}")]
    RemoteStatus {
        operation: &'static str,
        board_id: String,
        status: u16,
    },

    #[error("Board not found: {board_id}")]
    BoardNotFound { board_id: String },

    // ===================
    // Session
    // ===================
    #[error("No board is active in this session")]
    NoActiveBoard,

    #[error("Column not found: {column_id}")]
    ColumnNotFound { column_id: String },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    // ===================
    // Serialization
    // ===================
    #[error("Failed to serialize board content: {message}")]
    ContentSerialize {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    /// Build a transport-level remote error from a reqwest failure
    pub fn remote_transport(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Remote {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Build a remote error with no underlying transport cause
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            source: None,
        }
    }

    /// True for failures the session recovers from locally (cache
    /// fallback on load, dirty-retained on flush)
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::RemoteStatus { .. })
    }
}
