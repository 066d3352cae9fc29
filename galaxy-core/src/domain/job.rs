//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Free-form job parameters stored alongside the job row
pub type Params = HashMap<String, serde_json::Value>;

/// A unit of background work tracked by one of the poll loops
///
/// Every background entity (deferred job, transfer, workflow invocation,
/// installed tool shed repository) shares this shape; `kind` tells the
/// loops apart and `plugin` names the handler that drives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub plugin: String,
    pub state: JobState,
    pub params: Params,
    /// Status or error message from the last transition
    pub info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    /// Last time a plugin looked at this job
    pub last_check: Option<DateTime<Utc>>,
}

impl Job {
    /// Builds a fresh job in the `New` state
    pub fn new(kind: JobKind, plugin: impl Into<String>, params: Params) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            plugin: plugin.into(),
            state: JobState::New,
            params,
            info: None,
            created_at: now,
            update_time: now,
            last_check: None,
        }
    }

    /// Returns a string parameter, if present and a string
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Whether enough time has passed since `last_check` to look at the job again
    pub fn is_due(&self, check_interval: Option<std::time::Duration>, now: DateTime<Utc>) -> bool {
        match (check_interval, self.last_check) {
            (Some(interval), Some(last)) => match chrono::Duration::from_std(interval) {
                Ok(interval) => now - last >= interval,
                Err(_) => false,
            },
            _ => true,
        }
    }
}

/// Which background subsystem a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Deferred,
    Transfer,
    WorkflowInvocation,
    ToolShedRepository,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Deferred,
        JobKind::Transfer,
        JobKind::WorkflowInvocation,
        JobKind::ToolShedRepository,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Deferred => "deferred",
            JobKind::Transfer => "transfer",
            JobKind::WorkflowInvocation => "workflow_invocation",
            JobKind::ToolShedRepository => "tool_shed_repository",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deferred" => Ok(JobKind::Deferred),
            "transfer" => Ok(JobKind::Transfer),
            "workflow_invocation" | "workflow" => Ok(JobKind::WorkflowInvocation),
            "tool_shed_repository" | "repository" => Ok(JobKind::ToolShedRepository),
            _ => Err(ParseError::Kind(s.to_string())),
        }
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    New,
    Waiting,
    Running,
    Ready,
    Scheduled,
    Done,
    Error,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::New => "new",
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Ready => "ready",
            JobState::Scheduled => "scheduled",
            JobState::Done => "done",
            JobState::Error => "error",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Terminal states are never left without an explicit re-queue.
    ///
    /// `Done` is terminal for the work-driving loops; the repository update
    /// loop still revisits installed (`Done`) repositories without moving them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Scheduled | JobState::Done | JobState::Error | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "new" => Ok(JobState::New),
            "waiting" => Ok(JobState::Waiting),
            "running" => Ok(JobState::Running),
            "ready" => Ok(JobState::Ready),
            "scheduled" => Ok(JobState::Scheduled),
            "done" => Ok(JobState::Done),
            "error" => Ok(JobState::Error),
            "cancelled" => Ok(JobState::Cancelled),
            _ => Err(ParseError::State(s.to_string())),
        }
    }
}

/// Error returned when a stored kind or state string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown job kind: {0}")]
    Kind(String),

    #[error("unknown job state: {0}")]
    State(String),
}
