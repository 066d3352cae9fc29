//! The background subsystems and the jobs each one polls

use galaxy_core::domain::job::{JobKind, JobState};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Deferred job queue
    DeferredJobs,
    /// Transfer manager
    Transfers,
    /// Workflow invocation scheduling
    WorkflowScheduling,
    /// Tool shed repository update checks
    RepositoryUpdates,
}

impl Subsystem {
    pub const ALL: [Subsystem; 4] = [
        Subsystem::DeferredJobs,
        Subsystem::Transfers,
        Subsystem::WorkflowScheduling,
        Subsystem::RepositoryUpdates,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Subsystem::DeferredJobs => "deferred",
            Subsystem::Transfers => "transfer",
            Subsystem::WorkflowScheduling => "workflow",
            Subsystem::RepositoryUpdates => "repository_update",
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Subsystem::DeferredJobs => JobKind::Deferred,
            Subsystem::Transfers => JobKind::Transfer,
            Subsystem::WorkflowScheduling => JobKind::WorkflowInvocation,
            Subsystem::RepositoryUpdates => JobKind::ToolShedRepository,
        }
    }

    /// States a pass picks jobs up in
    pub fn states(&self) -> &'static [JobState] {
        match self {
            Subsystem::DeferredJobs => &[JobState::New, JobState::Waiting],
            Subsystem::Transfers => &[JobState::New, JobState::Running],
            Subsystem::WorkflowScheduling => &[JobState::New, JobState::Ready],
            Subsystem::RepositoryUpdates => &[JobState::Done],
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subsystem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" | "deferred_jobs" => Ok(Subsystem::DeferredJobs),
            "transfer" | "transfers" => Ok(Subsystem::Transfers),
            "workflow" | "workflow_scheduling" => Ok(Subsystem::WorkflowScheduling),
            "repository_update" | "repository_updates" => Ok(Subsystem::RepositoryUpdates),
            other => anyhow::bail!("unknown subsystem '{}'", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        for subsystem in Subsystem::ALL {
            assert_eq!(subsystem.name().parse::<Subsystem>().unwrap(), subsystem);
        }
        assert_eq!(
            " Workflow ".parse::<Subsystem>().unwrap(),
            Subsystem::WorkflowScheduling
        );
        assert!("metrics".parse::<Subsystem>().is_err());
    }

    #[test]
    fn test_states_never_include_terminal_for_job_queues() {
        for subsystem in [
            Subsystem::DeferredJobs,
            Subsystem::Transfers,
            Subsystem::WorkflowScheduling,
        ] {
            assert!(subsystem.states().iter().all(|s| !s.is_terminal()));
        }
        assert_eq!(Subsystem::RepositoryUpdates.states(), &[JobState::Done]);
    }
}
