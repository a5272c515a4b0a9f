//! Hive Errors
//!
//! One error type for the whole coordination layer. Callers are expected to
//! surface `Validation` and `NotFound` immediately and to retry only on
//! `Conflict`, after re-reading current state.

use std::fmt;
use thiserror::Error;

use crate::store::Collection;
use crate::tasks::TaskStatus;

/// Result type alias for coordination operations
pub type HiveResult<T> = Result<T, HiveError>;

/// Kind of entity a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Agent,
    Message,
    Task,
    /// A `(message, agent)` pair in the read-state index
    ReadState,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Agent => "Agent",
            EntityKind::Message => "Message",
            EntityKind::Task => "Task",
            EntityKind::ReadState => "Read-state entry",
        };
        f.write_str(name)
    }
}

/// Error types for coordination operations
#[derive(Debug, Error)]
pub enum HiveError {
    /// Malformed input (empty assignee list, empty agent id, bad document)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Reference to an unknown agent, message, task or read-state entry
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Task status change not permitted from the current state
    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Concurrent-write collision on the durable store
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// A multi-collection commit stopped part-way
    #[error("Partial commit: wrote {written:?}, failed on {failed}: {source}")]
    PartialCommit {
        written: Vec<Collection>,
        failed: Collection,
        #[source]
        source: Box<HiveError>,
    },

    /// A collection file exists but does not parse
    #[error("Corrupt collection {collection}: {reason}")]
    Corrupt {
        collection: Collection,
        reason: String,
    },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for HiveError {
    fn from(err: serde_json::Error) -> Self {
        HiveError::Serialization(err.to_string())
    }
}

impl HiveError {
    pub(crate) fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        HiveError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        HiveError::Validation(reason.into())
    }

    /// Whether the caller should re-read state and try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, HiveError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HiveError::NotFound { .. })
    }
}
