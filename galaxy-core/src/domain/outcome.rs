//! Plugin outcome types
//!
//! Plugins report readiness through [`CheckOutcome`] and ask for state
//! changes through [`Transition`]. Errors returned by plugin calls are
//! reserved for unexpected failures; "not ready yet" is never an error.

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobState, Params};

/// Result of asking a plugin whether a job can make progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckOutcome {
    /// The job can be run now
    Ready,
    /// Nothing to do yet, look again on a later pass
    NotReady,
    /// The job can never complete
    Failed(String),
}

impl CheckOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        CheckOutcome::Failed(reason.into())
    }
}

/// A state change requested by a plugin
///
/// `params`, when set, replaces the job's stored parameters. `info`
/// replaces the stored status message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: JobState,
    pub params: Option<Params>,
    pub info: Option<String>,
}

impl Transition {
    /// Move to `state` without touching params or info
    pub fn to(state: JobState) -> Self {
        Self {
            state,
            params: None,
            info: None,
        }
    }

    /// Move to `Error` with a message
    pub fn error(info: impl Into<String>) -> Self {
        Self {
            state: JobState::Error,
            params: None,
            info: Some(info.into()),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_builders() {
        let t = Transition::to(JobState::Done).with_info("finished");
        assert_eq!(t.state, JobState::Done);
        assert_eq!(t.info.as_deref(), Some("finished"));
        assert!(t.params.is_none());

        let t = Transition::error("boom");
        assert_eq!(t.state, JobState::Error);
        assert_eq!(t.info.as_deref(), Some("boom"));
    }

    #[test]
    fn test_failed_outcome() {
        assert_eq!(
            CheckOutcome::failed("bad input"),
            CheckOutcome::Failed("bad input".to_string())
        );
    }
}
