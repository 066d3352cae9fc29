//! In-memory job store
//!
//! Keeps jobs in a process-local map. Used by the test suite and by the
//! daemon when no database is configured. Every mutating call bumps a
//! write counter so callers can assert that a pass wrote nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use galaxy_core::domain::job::{Job, JobKind, JobState};
use galaxy_core::domain::outcome::Transition;
use galaxy_core::dto::job::{CreateJob, JobFilter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::{JobStore, can_requeue};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
    writes: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a job as-is, keeping its state and timestamps
    pub async fn insert(&self, job: Job) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.jobs.write().await.insert(job.id, job);
    }

    /// Number of mutating calls served so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn apply(job: &mut Job, transition: &Transition) {
    job.state = transition.state;
    if let Some(params) = &transition.params {
        job.params = params.clone();
    }
    job.info = transition.info.clone();
    job.update_time = Utc::now();
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, req: CreateJob) -> Result<Job> {
        let job = req.into_job();
        self.insert(job.clone()).await;
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_by_states(&self, kind: JobKind, states: &[JobState]) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut found: Vec<Job> = jobs
            .values()
            .filter(|j| j.kind == kind && states.contains(&j.state))
            .cloned()
            .collect();
        found.sort_by_key(|j| j.created_at);
        Ok(found)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut found: Vec<Job> = jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update_state(&self, id: Uuid, transition: &Transition) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        apply(job, transition);
        self.bump();
        Ok(job.clone())
    }

    async fn update_state_from(
        &self,
        id: Uuid,
        from: JobState,
        transition: &Transition,
    ) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if job.state != from {
            return Err(StoreError::StateChanged {
                id,
                expected: from,
                actual: job.state,
            });
        }

        apply(job, transition);
        self.bump();
        Ok(job.clone())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.last_check = Some(at);

        self.bump();
        Ok(())
    }

    async fn requeue(&self, id: Uuid) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !can_requeue(job.state) {
            return Err(StoreError::InvalidState {
                id,
                state: job.state,
                action: "requeue",
            });
        }

        job.state = JobState::New;
        job.info = None;
        job.last_check = None;
        job.update_time = Utc::now();

        self.bump();
        Ok(job.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let removed = self.jobs.write().await.remove(&id).is_some();
        if removed {
            self.bump();
        }
        Ok(removed)
    }
}
