//! PostgreSQL job store
//!
//! Handles all database operations related to jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use galaxy_core::domain::job::{Job, JobKind, JobState};
use galaxy_core::domain::outcome::Transition;
use galaxy_core::dto::job::{CreateJob, JobFilter};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::{JobStore, can_requeue};

const JOB_COLUMNS: &str =
    "id, kind, plugin, state, params, info, created_at, update_time, last_check";

/// Job store backed by a sqlx PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, id: Uuid) -> Result<Job> {
        self.find_by_id(id).await?.ok_or(StoreError::NotFound(id))
    }

    /// Applies `transition`, optionally only when the row is still in `from`
    ///
    /// Returns `None` when no row matched.
    async fn write_transition(
        &self,
        id: Uuid,
        from: Option<JobState>,
        transition: &Transition,
    ) -> Result<Option<Job>> {
        let params = transition
            .params
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE galaxy_jobs
            SET state = $1, params = COALESCE($2, params), info = $3, update_time = $4
            WHERE id = $5 AND ($6::text IS NULL OR state = $6)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(transition.state.as_str())
        .bind(params)
        .bind(&transition.info)
        .bind(Utc::now())
        .bind(id)
        .bind(from.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, req: CreateJob) -> Result<Job> {
        let job = req.into_job();

        sqlx::query(
            r#"
            INSERT INTO galaxy_jobs (id, kind, plugin, state, params, created_at, update_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id)
        .bind(job.kind.as_str())
        .bind(&job.plugin)
        .bind(job.state.as_str())
        .bind(serde_json::to_value(&job.params)?)
        .bind(job.created_at)
        .bind(job.update_time)
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM galaxy_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_by_states(&self, kind: JobKind, states: &[JobState]) -> Result<Vec<Job>> {
        let states: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM galaxy_jobs
            WHERE kind = $1 AND state = ANY($2)
            ORDER BY created_at ASC
            "#
        ))
        .bind(kind.as_str())
        .bind(&states)
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM galaxy_jobs
            WHERE ($1::text IS NULL OR kind = $1)
              AND ($2::text IS NULL OR state = $2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.state.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }

    async fn update_state(&self, id: Uuid, transition: &Transition) -> Result<Job> {
        self.write_transition(id, None, transition)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_state_from(
        &self,
        id: Uuid,
        from: JobState,
        transition: &Transition,
    ) -> Result<Job> {
        match self.write_transition(id, Some(from), transition).await? {
            Some(job) => Ok(job),
            None => {
                let current = self.fetch(id).await?;
                Err(StoreError::StateChanged {
                    id,
                    expected: from,
                    actual: current.state,
                })
            }
        }
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE galaxy_jobs SET last_check = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn requeue(&self, id: Uuid) -> Result<Job> {
        let job = self.fetch(id).await?;
        if !can_requeue(job.state) {
            return Err(StoreError::InvalidState {
                id,
                state: job.state,
                action: "requeue",
            });
        }

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE galaxy_jobs
            SET state = $1, info = NULL, last_check = NULL, update_time = $2
            WHERE id = $3 AND state = $4
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(JobState::New.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(job.state.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Job::try_from(row),
            // Someone moved the job between the read and the update
            None => {
                let current = self.fetch(id).await?;
                Err(StoreError::InvalidState {
                    id,
                    state: current.state,
                    action: "requeue",
                })
            }
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM galaxy_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    plugin: String,
    state: String,
    params: serde_json::Value,
    info: Option<String>,
    created_at: DateTime<Utc>,
    update_time: DateTime<Utc>,
    last_check: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            kind: row.kind.parse()?,
            plugin: row.plugin,
            state: row.state.parse()?,
            params: serde_json::from_value(row.params)?,
            info: row.info,
            created_at: row.created_at,
            update_time: row.update_time,
            last_check: row.last_check,
        })
    }
}

/// Decodes rows, skipping the ones that do not form a valid job
///
/// A single corrupt row must not stop the other jobs of its kind from
/// being polled.
fn decode_rows(rows: Vec<JobRow>) -> Vec<Job> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match Job::try_from(row) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!("Skipping job {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str, state: &str) -> JobRow {
        JobRow {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            plugin: "shell".to_string(),
            state: state.to_string(),
            params: serde_json::json!({ "command": "true" }),
            info: None,
            created_at: Utc::now(),
            update_time: Utc::now(),
            last_check: None,
        }
    }

    #[test]
    fn test_row_decodes() {
        let job = Job::try_from(row("deferred", "waiting")).unwrap();
        assert_eq!(job.kind, JobKind::Deferred);
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.param_str("command"), Some("true"));
    }

    #[test]
    fn test_row_with_unknown_state_is_corrupt() {
        let err = Job::try_from(row("deferred", "ok")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_corrupt_rows_are_skipped() {
        let good = row("deferred", "new");
        let good_id = good.id;
        let mut bad_params = row("deferred", "new");
        bad_params.params = serde_json::json!("not an object");

        let jobs = decode_rows(vec![bad_params, good, row("deferred", "bogus")]);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, good_id);
    }

    #[test]
    fn test_row_with_non_object_params_is_rejected() {
        let mut bad = row("transfer", "new");
        bad.params = serde_json::json!([1, 2, 3]);
        assert!(matches!(
            Job::try_from(bad).unwrap_err(),
            StoreError::Serialization(_)
        ));
    }
}
