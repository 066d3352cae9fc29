//! Galaxy Store
//!
//! Persistence for background jobs. The poll loops, plugins and the CLI
//! all talk to a [`JobStore`]; two implementations are provided:
//! - [`PgJobStore`]: PostgreSQL through a sqlx connection pool
//! - [`MemoryJobStore`]: process-local map, used in tests and development
//!
//! There is no row locking across processes: two daemons polling the same
//! table may pick up the same job.

pub mod db;
pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use galaxy_core::domain::job::{Job, JobKind, JobState};
use galaxy_core::domain::outcome::Transition;
use galaxy_core::dto::job::{CreateJob, JobFilter};
use uuid::Uuid;

/// Data access for job rows
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new job in the `New` state
    async fn create(&self, req: CreateJob) -> Result<Job>;

    /// Finds a job by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>>;

    /// Jobs of `kind` in any of `states`, oldest first
    async fn find_by_states(&self, kind: JobKind, states: &[JobState]) -> Result<Vec<Job>>;

    /// All jobs matching `filter`, newest first
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>>;

    /// Writes a transition and returns the updated job
    async fn update_state(&self, id: Uuid, transition: &Transition) -> Result<Job>;

    /// Writes a transition only if the job is still in state `from`
    ///
    /// Fails with [`StoreError::StateChanged`] when another writer (an
    /// operator cancelling the job, say) got there first.
    async fn update_state_from(
        &self,
        id: Uuid,
        from: JobState,
        transition: &Transition,
    ) -> Result<Job>;

    /// Records that a plugin looked at the job
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Moves an `Error` or `Cancelled` job back to `New`
    async fn requeue(&self, id: Uuid) -> Result<Job>;

    /// Deletes a job, returning whether it existed
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// States a job may be re-queued from
pub fn can_requeue(state: JobState) -> bool {
    matches!(state, JobState::Error | JobState::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_requeue() {
        assert!(can_requeue(JobState::Error));
        assert!(can_requeue(JobState::Cancelled));
        assert!(!can_requeue(JobState::New));
        assert!(!can_requeue(JobState::Running));
        assert!(!can_requeue(JobState::Done));
    }
}
