//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::{Job, JobKind, JobState, Params};

/// Request to create a new job in the `New` state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub kind: JobKind,
    pub plugin: String,
    #[serde(default)]
    pub params: Params,
}

impl CreateJob {
    pub fn new(kind: JobKind, plugin: impl Into<String>) -> Self {
        Self {
            kind,
            plugin: plugin.into(),
            params: Params::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Materialises the request into a job record
    pub fn into_job(self) -> Job {
        Job::new(self.kind, self.plugin, self.params)
    }
}

/// Filter used when listing jobs; `None` fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub kind: Option<JobKind>,
    pub state: Option<JobState>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.kind.is_none_or(|k| k == job.kind) && self.state.is_none_or(|s| s == job.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_job_into_job() {
        let job = CreateJob::new(JobKind::Transfer, "http")
            .with_param("url", serde_json::json!("https://example.org/x"))
            .into_job();

        assert_eq!(job.kind, JobKind::Transfer);
        assert_eq!(job.plugin, "http");
        assert_eq!(job.state, JobState::New);
        assert_eq!(job.param_str("url"), Some("https://example.org/x"));
        assert!(job.last_check.is_none());
    }

    #[test]
    fn test_filter_matches() {
        let job = CreateJob::new(JobKind::Deferred, "shell").into_job();

        assert!(JobFilter::default().matches(&job));
        assert!(
            JobFilter {
                kind: Some(JobKind::Deferred),
                state: Some(JobState::New)
            }
            .matches(&job)
        );
        assert!(
            !JobFilter {
                kind: Some(JobKind::Transfer),
                state: None
            }
            .matches(&job)
        );
        assert!(
            !JobFilter {
                kind: None,
                state: Some(JobState::Error)
            }
            .matches(&job)
        );
    }
}
