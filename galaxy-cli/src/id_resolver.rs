//! ID resolver module
//!
//! Handles resolution of UUID prefixes to full UUIDs by querying the store.
//! This allows users to specify short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use galaxy_core::dto::job::JobFilter;
use galaxy_store::JobStore;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a job ID or prefix to a full UUID
///
/// A full UUID is returned as-is. A prefix is matched against the jobs
/// selected by `filter` and must match exactly one of them.
pub async fn resolve_job_id(
    store: &dyn JobStore,
    id_or_prefix: &IdOrPrefix,
    filter: &JobFilter,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let jobs = store
        .list(filter)
        .await
        .context("Failed to fetch jobs for ID resolution")?;

    let matches: Vec<Uuid> = jobs
        .iter()
        .map(|j| j.id)
        .filter(|id| id_or_prefix.matches(*id))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No job found with ID starting with '{}'", id_or_prefix)),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|id| id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galaxy_core::domain::job::{Job, JobKind};
    use galaxy_store::MemoryJobStore;

    fn job_with_id(id: &str, kind: JobKind) -> Job {
        let mut job = Job::new(kind, "shell", Default::default());
        job.id = Uuid::parse_str(id).unwrap();
        job
    }

    async fn store() -> MemoryJobStore {
        let store = MemoryJobStore::new();
        store
            .insert(job_with_id(
                "aa11aaaa-0000-4000-8000-000000000001",
                JobKind::Deferred,
            ))
            .await;
        store
            .insert(job_with_id(
                "aa22aaaa-0000-4000-8000-000000000002",
                JobKind::Deferred,
            ))
            .await;
        store
            .insert(job_with_id(
                "bb11bbbb-0000-4000-8000-000000000003",
                JobKind::Transfer,
            ))
            .await;
        store
    }

    #[tokio::test]
    async fn test_resolves_unique_prefix() {
        let store = store().await;
        let id = resolve_job_id(&store, &IdOrPrefix::parse("aa2"), &JobFilter::default())
            .await
            .unwrap();
        assert_eq!(id.to_string(), "aa22aaaa-0000-4000-8000-000000000002");
    }

    #[tokio::test]
    async fn test_ambiguous_and_missing_prefixes() {
        let store = store().await;
        let filter = JobFilter::default();

        let err = resolve_job_id(&store, &IdOrPrefix::parse("aa"), &filter)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));

        let err = resolve_job_id(&store, &IdOrPrefix::parse("cc"), &filter)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No job found"));
    }

    #[tokio::test]
    async fn test_filter_narrows_candidates() {
        let store = store().await;
        let filter = JobFilter {
            kind: Some(JobKind::Transfer),
            state: None,
        };

        let err = resolve_job_id(&store, &IdOrPrefix::parse("aa1"), &filter)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No job found"));
        assert!(
            resolve_job_id(&store, &IdOrPrefix::parse("bb"), &filter)
                .await
                .is_ok()
        );
    }
}
