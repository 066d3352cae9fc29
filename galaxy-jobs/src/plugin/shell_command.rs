//! Deferred jobs that run a shell command
//!
//! The command comes from the job's `command` parameter and runs through
//! the configured [`Shell`], so it is subject to the shell timeout.

use anyhow::{Context, Result};
use async_trait::async_trait;
use galaxy_core::domain::job::{Job, JobKind, JobState};
use galaxy_core::domain::outcome::{CheckOutcome, Transition};
use std::sync::Arc;
use tracing::info;

use super::JobPlugin;
use crate::shell::{Shell, TIMEOUT_ERROR_MESSAGE};

pub const NAME: &str = "shell";

/// Stored output is cut to this many bytes
const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

pub struct ShellCommandPlugin {
    shell: Arc<dyn Shell>,
}

impl ShellCommandPlugin {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self { shell }
    }
}

fn truncate(text: &str) -> &str {
    if text.len() <= MAX_CAPTURED_OUTPUT {
        return text;
    }
    let mut end = MAX_CAPTURED_OUTPUT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait]
impl JobPlugin for ShellCommandPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> JobKind {
        JobKind::Deferred
    }

    async fn check_job(&self, job: &Job) -> Result<CheckOutcome> {
        match job.param_str("command") {
            Some(command) if !command.trim().is_empty() => Ok(CheckOutcome::Ready),
            _ => Ok(CheckOutcome::failed("command parameter is missing")),
        }
    }

    async fn run_job(&self, job: &Job) -> Result<Transition> {
        let command = job
            .param_str("command")
            .context("command parameter is missing")?;

        info!("Job {} running command: {}", job.id, command);
        let output = self.shell.execute(command).await?;

        let mut params = job.params.clone();
        params.insert(
            "stdout".to_string(),
            serde_json::json!(truncate(&output.stdout)),
        );
        params.insert(
            "return_code".to_string(),
            serde_json::json!(output.return_code),
        );

        let transition = if output.success() {
            Transition::to(JobState::Done)
        } else if output.timed_out() {
            Transition::error(TIMEOUT_ERROR_MESSAGE)
        } else {
            let stderr = truncate(output.stderr.trim());
            if stderr.is_empty() {
                Transition::error(format!("command exited with code {}", output.return_code))
            } else {
                Transition::error(format!(
                    "command exited with code {}: {}",
                    output.return_code, stderr
                ))
            }
        };

        Ok(transition.with_params(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{LocalShell, ShellOutput, TIMEOUT_RETURN_CODE};
    use galaxy_core::dto::job::CreateJob;
    use std::time::Duration;

    struct CannedShell(ShellOutput);

    #[async_trait]
    impl Shell for CannedShell {
        async fn execute(&self, _command: &str) -> Result<ShellOutput> {
            Ok(self.0.clone())
        }
    }

    fn job(command: &str) -> Job {
        CreateJob::new(JobKind::Deferred, NAME)
            .with_param("command", serde_json::json!(command))
            .into_job()
    }

    #[tokio::test]
    async fn test_successful_command_is_done() {
        let plugin = ShellCommandPlugin::new(Arc::new(LocalShell::new(Duration::from_secs(10))));
        let job = job("echo finished");

        assert_eq!(plugin.check_job(&job).await.unwrap(), CheckOutcome::Ready);
        let transition = plugin.run_job(&job).await.unwrap();

        assert_eq!(transition.state, JobState::Done);
        let params = transition.params.unwrap();
        assert_eq!(params["stdout"], serde_json::json!("finished\n"));
        assert_eq!(params["return_code"], serde_json::json!(0));
        assert_eq!(params["command"], serde_json::json!("echo finished"));
    }

    #[tokio::test]
    async fn test_failing_command_is_error() {
        let plugin = ShellCommandPlugin::new(Arc::new(LocalShell::new(Duration::from_secs(10))));
        let transition = plugin.run_job(&job("echo broken >&2; exit 2")).await.unwrap();

        assert_eq!(transition.state, JobState::Error);
        assert_eq!(
            transition.info.as_deref(),
            Some("command exited with code 2: broken")
        );
    }

    #[tokio::test]
    async fn test_signalled_command_reports_exit_code() {
        let plugin = ShellCommandPlugin::new(Arc::new(LocalShell::new(Duration::from_secs(10))));
        let transition = plugin.run_job(&job("kill -HUP $$")).await.unwrap();

        assert_eq!(transition.state, JobState::Error);
        assert_eq!(
            transition.info.as_deref(),
            Some("command exited with code 129")
        );
        assert_eq!(transition.params.unwrap()["return_code"], serde_json::json!(129));
    }

    #[tokio::test]
    async fn test_timed_out_command_is_error() {
        let plugin = ShellCommandPlugin::new(Arc::new(CannedShell(ShellOutput {
            stdout: String::new(),
            stderr: TIMEOUT_ERROR_MESSAGE.to_string(),
            return_code: TIMEOUT_RETURN_CODE,
        })));
        let transition = plugin.run_job(&job("sleep 600")).await.unwrap();

        assert_eq!(transition.state, JobState::Error);
        assert_eq!(transition.info.as_deref(), Some(TIMEOUT_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_missing_command_fails_check() {
        let plugin = ShellCommandPlugin::new(Arc::new(LocalShell::default()));
        let job = CreateJob::new(JobKind::Deferred, NAME).into_job();

        assert!(matches!(
            plugin.check_job(&job).await.unwrap(),
            CheckOutcome::Failed(_)
        ));
        assert!(plugin.run_job(&job).await.is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(MAX_CAPTURED_OUTPUT);
        let cut = truncate(&long);
        assert!(cut.len() <= MAX_CAPTURED_OUTPUT);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(truncate("short"), "short");
    }
}
