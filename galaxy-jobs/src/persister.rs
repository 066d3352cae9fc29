//! State persister
//!
//! Writes plugin transitions back to the store as soon as they happen.
//! Errors are returned to the caller so that only the job being handled
//! is affected.

use chrono::{DateTime, Utc};
use galaxy_core::domain::job::{Job, JobState};
use galaxy_core::domain::outcome::Transition;
use galaxy_store::{JobStore, StoreError};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct StatePersister {
    store: Arc<dyn JobStore>,
}

impl StatePersister {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Persists a transition for `job` and returns the stored row
    ///
    /// The write only happens while the row is still in `job.state`. If
    /// something else moved the job in the meantime (an operator cancel,
    /// for one) the transition is dropped and `None` is returned.
    pub async fn record(
        &self,
        job: &Job,
        transition: Transition,
    ) -> Result<Option<Job>, StoreError> {
        let updated = match self
            .store
            .update_state_from(job.id, job.state, &transition)
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::StateChanged { actual, .. }) => {
                info!(
                    "{} job {} is now {}, dropping transition to {}",
                    job.kind, job.id, actual, transition.state
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if job.state != updated.state {
            info!(
                "{} job {} ({}): {} -> {}",
                job.kind, job.id, job.plugin, job.state, updated.state
            );
        } else {
            debug!("{} job {} stays {}", job.kind, job.id, updated.state);
        }

        Ok(Some(updated))
    }

    /// Moves `job` to `Error` with `reason`
    pub async fn mark_error(
        &self,
        job: &Job,
        reason: impl Into<String>,
    ) -> Result<Option<Job>, StoreError> {
        let reason = reason.into();
        warn!("{} job {} failed: {}", job.kind, job.id, reason);
        self.record(job, Transition::to(JobState::Error).with_info(reason))
            .await
    }

    /// Records that the job was looked at
    pub async fn touch(&self, job: &Job, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.store.touch(job.id, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galaxy_core::domain::job::JobKind;
    use galaxy_core::dto::job::CreateJob;
    use galaxy_store::MemoryJobStore;
    use uuid::Uuid;

    async fn setup() -> (Arc<MemoryJobStore>, StatePersister, Job) {
        let store = Arc::new(MemoryJobStore::new());
        let job = store
            .create(
                CreateJob::new(JobKind::Deferred, "shell")
                    .with_param("command", serde_json::json!("true")),
            )
            .await
            .unwrap();
        let persister = StatePersister::new(store.clone());
        (store, persister, job)
    }

    #[tokio::test]
    async fn test_record_writes_immediately() {
        let (store, persister, job) = setup().await;

        let mut params = job.params.clone();
        params.insert("stdout".to_string(), serde_json::json!("ok\n"));
        let updated = persister
            .record(
                &job,
                Transition::to(JobState::Done)
                    .with_params(params)
                    .with_info("finished"),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.state, JobState::Done);
        let stored = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Done);
        assert_eq!(stored.info.as_deref(), Some("finished"));
        assert_eq!(stored.params["stdout"], serde_json::json!("ok\n"));
        assert_eq!(stored.params["command"], serde_json::json!("true"));
    }

    #[tokio::test]
    async fn test_mark_error_keeps_params() {
        let (store, persister, job) = setup().await;

        persister.mark_error(&job, "plugin exploded").await.unwrap();

        let stored = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Error);
        assert_eq!(stored.info.as_deref(), Some("plugin exploded"));
        assert_eq!(stored.params["command"], serde_json::json!("true"));
    }

    #[tokio::test]
    async fn test_touch_sets_last_check() {
        let (store, persister, job) = setup().await;
        let now = Utc::now();

        persister.touch(&job, now).await.unwrap();

        let stored = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.last_check, Some(now));
        assert_eq!(stored.state, JobState::New);
    }

    #[tokio::test]
    async fn test_record_skips_job_moved_by_someone_else() {
        let (store, persister, job) = setup().await;
        store
            .update_state(job.id, &Transition::to(JobState::Cancelled).with_info("by operator"))
            .await
            .unwrap();

        let recorded = persister
            .record(&job, Transition::to(JobState::Done))
            .await
            .unwrap();
        assert!(recorded.is_none());
        assert!(persister.mark_error(&job, "late").await.unwrap().is_none());

        let stored = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Cancelled);
        assert_eq!(stored.info.as_deref(), Some("by operator"));
    }

    #[tokio::test]
    async fn test_missing_job_is_an_error() {
        let (_store, persister, mut job) = setup().await;
        job.id = Uuid::new_v4();

        let err = persister
            .record(&job, Transition::to(JobState::Done))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
