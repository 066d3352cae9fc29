//! Scheduler layer
//!
//! One [`Poller`] per enabled [`Subsystem`]. Each poller queries the store
//! for its kind of job, lets the owning plugin decide what happens next and
//! persists the outcome, then sleeps until the next pass.

pub mod poller;
pub mod subsystem;

pub use poller::Poller;
pub use subsystem::Subsystem;

use anyhow::Result;
use galaxy_core::domain::job::JobKind;
use tracing::warn;

use crate::config::Config;
use crate::plugin::registry::PluginRegistry;

/// Checks that every enabled subsystem has a plugin to drive its jobs
///
/// Workflow scheduling without a workflow plugin is fatal; other
/// subsystems without a plugin only log a warning, since their jobs will
/// simply be marked as failed.
pub fn check_subsystems(config: &Config, registry: &PluginRegistry) -> Result<()> {
    for subsystem in &config.subsystems {
        let kind = subsystem.kind();
        if registry.has_kind(kind) {
            continue;
        }

        if kind == JobKind::WorkflowInvocation {
            anyhow::bail!(
                "{} is enabled but no workflow scheduler plugin is registered",
                subsystem
            );
        }
        warn!("{} is enabled but no plugin handles {} jobs", subsystem, kind);
    }
    Ok(())
}
