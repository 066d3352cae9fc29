//! Tool shed repository update checks
//!
//! Installed repositories are tracked as `Done` jobs. Each run asks the
//! repository's tool shed for its update status and stores the answer in
//! the `tool_shed_status` parameter; the job state itself never changes.
//! An unreachable tool shed yields the default status instead of failing.

use anyhow::Result;
use async_trait::async_trait;
use galaxy_core::domain::job::{Job, JobKind};
use galaxy_core::domain::outcome::{CheckOutcome, Transition};
use galaxy_core::domain::toolshed::RepositoryRef;
use galaxy_toolshed::ToolShedClient;
use std::time::Duration;
use tracing::{info, warn};

use super::JobPlugin;

pub const NAME: &str = "tool_shed_update";

const REQUIRED_PARAMS: &[&str] = &["tool_shed_url", "name", "owner", "changeset_revision"];

pub struct RepositoryUpdatePlugin {
    interval: Duration,
    timeout: Duration,
}

impl RepositoryUpdatePlugin {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

fn repository(job: &Job) -> Option<(String, RepositoryRef)> {
    Some((
        job.param_str("tool_shed_url")?.to_string(),
        RepositoryRef {
            name: job.param_str("name")?.to_string(),
            owner: job.param_str("owner")?.to_string(),
            changeset_revision: job.param_str("changeset_revision")?.to_string(),
        },
    ))
}

#[async_trait]
impl JobPlugin for RepositoryUpdatePlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> JobKind {
        JobKind::ToolShedRepository
    }

    fn check_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            anyhow::bail!("tool shed timeout must be greater than zero");
        }
        Ok(())
    }

    async fn check_job(&self, job: &Job) -> Result<CheckOutcome> {
        let missing: Vec<&str> = REQUIRED_PARAMS
            .iter()
            .copied()
            .filter(|key| job.param_str(key).is_none_or(|v| v.trim().is_empty()))
            .collect();

        if missing.is_empty() {
            Ok(CheckOutcome::Ready)
        } else {
            Ok(CheckOutcome::failed(format!(
                "missing repository parameters: {}",
                missing.join(", ")
            )))
        }
    }

    async fn run_job(&self, job: &Job) -> Result<Transition> {
        let Some((tool_shed_url, repo)) = repository(job) else {
            anyhow::bail!("job {} has incomplete repository parameters", job.id);
        };

        let client = ToolShedClient::with_timeout(&tool_shed_url, self.timeout)?;
        let status = client.status_or_default(&repo).await;

        let mut params = job.params.clone();
        params.insert("tool_shed_status".to_string(), serde_json::to_value(&status)?);

        let info = if status.repository_deprecated {
            format!("{}/{} is deprecated", repo.owner, repo.name)
        } else if status.has_update() {
            match client.next_installable_changeset_revision(&repo).await {
                Ok(Some(revision)) => {
                    params.insert(
                        "next_changeset_revision".to_string(),
                        serde_json::json!(revision),
                    );
                    format!("{}/{} can update to {}", repo.owner, repo.name, revision)
                }
                Ok(None) => format!("{}/{} has an update", repo.owner, repo.name),
                Err(e) => {
                    warn!(
                        "Failed to get next revision of {}/{}: {}",
                        repo.owner, repo.name, e
                    );
                    format!("{}/{} has an update", repo.owner, repo.name)
                }
            }
        } else {
            format!("{}/{} is up to date", repo.owner, repo.name)
        };

        info!("{}", info);
        Ok(Transition::to(job.state).with_params(params).with_info(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galaxy_core::domain::job::JobState;
    use galaxy_core::domain::toolshed::RepositoryStatus;
    use galaxy_core::dto::job::CreateJob;

    fn installed(tool_shed_url: &str) -> Job {
        let mut job = CreateJob::new(JobKind::ToolShedRepository, NAME)
            .with_param("tool_shed_url", serde_json::json!(tool_shed_url))
            .with_param("name", serde_json::json!("bwa"))
            .with_param("owner", serde_json::json!("devteam"))
            .with_param("changeset_revision", serde_json::json!("3c4a1b2d"))
            .into_job();
        job.state = JobState::Done;
        job
    }

    fn plugin() -> RepositoryUpdatePlugin {
        RepositoryUpdatePlugin::new(Duration::from_secs(24 * 3600), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_unreachable_tool_shed_stores_default_status() {
        let plugin = plugin();
        let job = installed("http://127.0.0.1:1");

        assert_eq!(plugin.check_job(&job).await.unwrap(), CheckOutcome::Ready);
        let transition = plugin.run_job(&job).await.unwrap();

        assert_eq!(transition.state, JobState::Done);
        let params = transition.params.unwrap();
        let status: RepositoryStatus =
            serde_json::from_value(params["tool_shed_status"].clone()).unwrap();
        assert_eq!(status, RepositoryStatus::default());
        assert_eq!(
            transition.info.as_deref(),
            Some("devteam/bwa is up to date")
        );
    }

    #[tokio::test]
    async fn test_missing_parameters_fail_check() {
        let plugin = plugin();
        let mut job = installed("https://toolshed.g2.bx.psu.edu");
        job.params.remove("owner");
        job.params
            .insert("changeset_revision".to_string(), serde_json::json!(" "));

        assert_eq!(
            plugin.check_job(&job).await.unwrap(),
            CheckOutcome::failed("missing repository parameters: owner, changeset_revision")
        );
        assert!(plugin.run_job(&job).await.is_err());
    }

    #[test]
    fn test_check_interval_and_validation() {
        assert_eq!(
            plugin().check_interval(),
            Some(Duration::from_secs(24 * 3600))
        );
        assert!(plugin().validate().is_ok());
        assert!(
            RepositoryUpdatePlugin::new(Duration::from_secs(1), Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
