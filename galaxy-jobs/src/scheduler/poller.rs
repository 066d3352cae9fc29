//! Generic poll loop
//!
//! A poller owns one subsystem. Each pass loads the subsystem's jobs in
//! their pickup states, oldest first, and handles them one after another:
//! the job's plugin is asked whether it can progress and its answer is
//! persisted straight away. A failure while handling one job marks that
//! job as failed and the pass moves on to the next.

use anyhow::{Context, Result};
use chrono::Utc;
use galaxy_core::domain::job::{Job, JobState};
use galaxy_core::domain::outcome::{CheckOutcome, Transition};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::Subsystem;
use crate::context::AppContext;
use crate::persister::StatePersister;
use crate::sleeper::{SleepResult, Sleeper};

/// Counters for a single pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Jobs loaded by the pass
    pub examined: usize,
    /// Jobs whose transition was persisted
    pub transitioned: usize,
    /// Jobs moved to `Error`
    pub failed: usize,
    /// Jobs left alone because their check interval had not elapsed
    pub skipped: usize,
}

/// What happened to one job during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handled {
    Skipped,
    Unchanged,
    Transitioned,
    Failed,
}

pub struct Poller {
    subsystem: Subsystem,
    interval: Duration,
    ctx: Arc<AppContext>,
    persister: StatePersister,
    sleeper: Arc<Sleeper>,
}

impl Poller {
    pub fn new(subsystem: Subsystem, ctx: Arc<AppContext>) -> Self {
        let interval = ctx.config.interval_for(subsystem);
        let persister = StatePersister::new(Arc::clone(&ctx.store));
        let sleeper = Arc::new(Sleeper::new(ctx.shutdown.clone()));
        Self {
            subsystem,
            interval,
            ctx,
            persister,
            sleeper,
        }
    }

    /// Handle for waking this loop before its interval is up
    pub fn sleeper(&self) -> Arc<Sleeper> {
        Arc::clone(&self.sleeper)
    }

    /// Runs passes until the shutdown token fires
    pub async fn run(&self) {
        info!(
            "Starting {} poller (interval: {:?})",
            self.subsystem, self.interval
        );

        loop {
            if self.ctx.shutdown.is_cancelled() {
                break;
            }

            match self.poll_once().await {
                Ok(summary) if summary.transitioned > 0 || summary.failed > 0 => {
                    info!("{} pass: {:?}", self.subsystem, summary);
                }
                Ok(summary) => debug!("{} pass: {:?}", self.subsystem, summary),
                Err(e) => error!("Error during {} pass: {:#}", self.subsystem, e),
            }

            match self.sleeper.sleep(self.interval).await {
                SleepResult::Cancelled => break,
                SleepResult::Woken => debug!("{} poller woken", self.subsystem),
                SleepResult::Elapsed => {}
            }
        }

        info!("{} poller stopped", self.subsystem);
    }

    /// Performs a single pass over the subsystem's pending jobs
    pub async fn poll_once(&self) -> Result<PassSummary> {
        let jobs = self
            .ctx
            .store
            .find_by_states(self.subsystem.kind(), self.subsystem.states())
            .await
            .with_context(|| format!("Failed to load {} jobs", self.subsystem.kind()))?;

        let mut summary = PassSummary::default();
        let pending: HashSet<Uuid> = jobs.iter().map(|job| job.id).collect();

        for job in jobs {
            if self.ctx.shutdown.is_cancelled() {
                debug!("{} pass interrupted by shutdown", self.subsystem);
                break;
            }

            summary.examined += 1;

            match self.process_job(&job).await {
                Ok(Handled::Skipped) => summary.skipped += 1,
                Ok(Handled::Unchanged) => {}
                Ok(Handled::Transitioned) => summary.transitioned += 1,
                Ok(Handled::Failed) => summary.failed += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!("Failed to process {} job {}: {:#}", job.kind, job.id, e);
                    if let Err(e) = self.persister.mark_error(&job, format!("{:#}", e)).await {
                        error!("Failed to mark job {} as failed: {}", job.id, e);
                    }
                }
            }
        }

        for plugin in self.ctx.registry.for_kind(self.subsystem.kind()) {
            plugin.retain(&pending).await;
        }

        Ok(summary)
    }

    async fn process_job(&self, job: &Job) -> Result<Handled> {
        let plugin = self
            .ctx
            .registry
            .get(&job.plugin)
            .with_context(|| format!("No plugin named '{}' is registered", job.plugin))?;

        if plugin.kind() != job.kind {
            anyhow::bail!(
                "Plugin '{}' handles {} jobs, not {}",
                job.plugin,
                plugin.kind(),
                job.kind
            );
        }

        let now = Utc::now();
        if !job.is_due(plugin.check_interval(), now) {
            return Ok(Handled::Skipped);
        }

        let outcome = plugin
            .check_job(job)
            .await
            .with_context(|| format!("Plugin '{}' failed to check job", job.plugin))?;
        self.persister.touch(job, now).await?;

        match outcome {
            CheckOutcome::NotReady => {
                let waits = self.subsystem.states().contains(&JobState::Waiting);
                if job.state == JobState::New && waits {
                    let recorded = self
                        .persister
                        .record(job, Transition::to(JobState::Waiting))
                        .await?;
                    Ok(recorded.map_or(Handled::Unchanged, |_| Handled::Transitioned))
                } else {
                    Ok(Handled::Unchanged)
                }
            }
            CheckOutcome::Failed(reason) => {
                let recorded = self.persister.mark_error(job, reason).await?;
                Ok(recorded.map_or(Handled::Unchanged, |_| Handled::Failed))
            }
            CheckOutcome::Ready => {
                let transition = plugin
                    .run_job(job)
                    .await
                    .with_context(|| format!("Plugin '{}' failed to run job", job.plugin))?;
                let failed = transition.state == JobState::Error;

                match self.persister.record(job, transition).await? {
                    None => Ok(Handled::Unchanged),
                    Some(_) if failed => Ok(Handled::Failed),
                    Some(_) => Ok(Handled::Transitioned),
                }
            }
        }
    }
}
