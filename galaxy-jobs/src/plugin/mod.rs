//! Job plugins
//!
//! A plugin drives jobs of one kind through their lifecycle. The poll loop
//! asks it whether a job can make progress (`check_job`) and, when it can,
//! lets it do the work (`run_job`) and persists the returned transition.
//!
//! Plugins are registered by name at startup through the
//! [`registry::PluginRegistry`]; jobs refer to them by that name.

pub mod data_transfer;
pub mod http_transfer;
pub mod registry;
pub mod repository_update;
pub mod shell_command;
pub mod workflow;

use anyhow::Result;
use async_trait::async_trait;
use galaxy_core::domain::job::{Job, JobKind};
use galaxy_core::domain::outcome::{CheckOutcome, Transition};
use galaxy_store::JobStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::shell::Shell;

/// Handler for one kind of background job
#[async_trait]
pub trait JobPlugin: Send + Sync {
    /// Name jobs use to refer to this plugin
    fn name(&self) -> &str;

    /// Kind of job this plugin handles
    fn kind(&self) -> JobKind;

    /// Minimum time between two looks at the same job
    ///
    /// `None` means the job is looked at on every pass.
    fn check_interval(&self) -> Option<Duration> {
        None
    }

    /// Checked once at registration; a failing plugin is not registered
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Reports whether `job` can make progress
    async fn check_job(&self, job: &Job) -> Result<CheckOutcome>;

    /// Does the work for a ready job and returns the state to persist
    async fn run_job(&self, job: &Job) -> Result<Transition>;

    /// Called after every pass with the jobs the pass picked up
    ///
    /// Anything the plugin keeps for a job outside `pending` (cancelled,
    /// purged, failed elsewhere) can be released.
    async fn retain(&self, _pending: &HashSet<Uuid>) {}
}

/// What the built-in plugins may need at construction
#[derive(Clone)]
pub struct PluginDeps {
    pub config: Config,
    pub store: Arc<dyn JobStore>,
    pub shell: Arc<dyn Shell>,
}
