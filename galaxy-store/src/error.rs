//! Error types for the job store

use galaxy_core::domain::job::{JobState, ParseError};
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur when reading or writing jobs
#[derive(Debug, Error)]
pub enum StoreError {
    /// No job with this ID
    #[error("job not found: {0}")]
    NotFound(Uuid),

    /// The requested operation is not allowed in the job's current state
    #[error("job {id} is in state {state}, cannot {action}")]
    InvalidState {
        id: Uuid,
        state: JobState,
        action: &'static str,
    },

    /// The job left the state the caller last saw
    #[error("job {id} moved from {expected} to {actual}")]
    StateChanged {
        id: Uuid,
        expected: JobState,
        actual: JobState,
    },

    /// A stored row could not be decoded
    #[error("corrupt job row: {0}")]
    Corrupt(#[from] ParseError),

    /// Params could not be (de)serialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_state_changed(&self) -> bool {
        matches!(self, Self::StateChanged { .. })
    }
}
