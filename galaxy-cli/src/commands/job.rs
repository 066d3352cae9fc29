//! Job command handlers
//!
//! Handles all job-related CLI commands: enqueueing new work, listing and
//! inspecting jobs, and the operator actions (requeue, cancel, purge).

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use galaxy_core::domain::job::{Job, JobKind, JobState};
use galaxy_core::domain::outcome::Transition;
use galaxy_core::dto::job::{CreateJob, JobFilter};
use galaxy_store::JobStore;

use crate::config::Config;
use crate::id_resolver::resolve_job_id;
use crate::types::{IdOrPrefix, parse_param};

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Create a job in the `new` state
    Enqueue {
        /// Job kind (deferred, transfer, workflow, repository)
        #[arg(short, long)]
        kind: JobKind,

        /// Plugin that handles the job
        #[arg(short, long)]
        plugin: String,

        /// Job parameter as key=value (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// List jobs, newest first
    List {
        #[arg(short, long)]
        kind: Option<JobKind>,

        #[arg(short, long)]
        state: Option<JobState>,
    },
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Move a failed or cancelled job back to `new`
    Requeue {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Cancel a job that has not finished
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Delete a finished job
    Purge {
        /// Job ID or unambiguous prefix
        id: String,

        /// Delete even if the job is still in progress
        #[arg(long)]
        force: bool,
    },
}

/// Routes job subcommands to their respective handlers
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let store = config.open_store().await?;

    match command {
        JobCommands::Enqueue {
            kind,
            plugin,
            params,
        } => enqueue_job(&store, kind, plugin, &params).await,
        JobCommands::List { kind, state } => list_jobs(&store, JobFilter { kind, state }).await,
        JobCommands::Get { id } => get_job(&store, &id).await,
        JobCommands::Requeue { id } => requeue_job(&store, &id).await,
        JobCommands::Cancel { id } => cancel_job(&store, &id).await,
        JobCommands::Purge { id, force } => purge_job(&store, &id, force).await,
    }
}

async fn enqueue_job(
    store: &dyn JobStore,
    kind: JobKind,
    plugin: String,
    params: &[String],
) -> Result<()> {
    let mut req = CreateJob::new(kind, plugin);
    for raw in params {
        let (key, value) = parse_param(raw)?;
        req = req.with_param(key, value);
    }

    let job = store.create(req).await?;

    println!("{}", "✓ Job enqueued".green().bold());
    println!("  ID:     {}", job.id.to_string().cyan());
    println!("  Kind:   {}", job.kind);
    println!("  Plugin: {}", job.plugin);

    Ok(())
}

async fn list_jobs(store: &dyn JobStore, filter: JobFilter) -> Result<()> {
    let jobs = store.list(&filter).await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs {
            print_job_summary(&job);
        }
    }

    Ok(())
}

async fn find_job(store: &dyn JobStore, id: &str) -> Result<Job> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_job_id(store, &id_or_prefix, &JobFilter::default()).await?;

    match store.find_by_id(uuid).await? {
        Some(job) => Ok(job),
        None => bail!("Job {} not found", uuid),
    }
}

async fn get_job(store: &dyn JobStore, id: &str) -> Result<()> {
    let job = find_job(store, id).await?;
    print_job_details(&job);
    Ok(())
}

async fn requeue_job(store: &dyn JobStore, id: &str) -> Result<()> {
    let job = find_job(store, id).await?;
    let job = store.requeue(job.id).await?;

    println!(
        "{} Job {} is {} again",
        "✓".green(),
        job.id.to_string().cyan(),
        colorize_state(job.state)
    );
    Ok(())
}

async fn cancel_job(store: &dyn JobStore, id: &str) -> Result<()> {
    let job = find_job(store, id).await?;
    if job.state.is_terminal() {
        bail!("Job {} already finished ({})", job.id, job.state);
    }

    let job = store
        .update_state_from(
            job.id,
            job.state,
            &Transition::to(JobState::Cancelled).with_info("cancelled by operator"),
        )
        .await?;

    println!(
        "{} Job {} {}",
        "✓".green(),
        job.id.to_string().cyan(),
        colorize_state(job.state)
    );
    Ok(())
}

async fn purge_job(store: &dyn JobStore, id: &str, force: bool) -> Result<()> {
    let job = find_job(store, id).await?;
    if !force && !job.state.is_terminal() {
        bail!(
            "Job {} is still {}; cancel it first or pass --force",
            job.id,
            job.state
        );
    }

    if store.delete(job.id).await? {
        println!("{} Purged job {}", "✓".green(), job.id.to_string().cyan());
    } else {
        println!("{}", format!("Job {} was already gone.", job.id).yellow());
    }
    Ok(())
}

/// Print a job summary
pub(crate) fn print_job_summary(job: &Job) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Kind:     {} ({})", job.kind, job.plugin);
    println!("    State:    {}", colorize_state(job.state));
    println!(
        "    Created:  {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(info) = &job.info {
        println!("    Info:     {}", info.dimmed());
    }
    println!();
}

/// Print detailed job information
fn print_job_details(job: &Job) {
    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.to_string().cyan());
    println!("  Kind:        {}", job.kind);
    println!("  Plugin:      {}", job.plugin);
    println!("  State:       {}", colorize_state(job.state));
    println!("  Created:     {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:     {}", job.update_time.format("%Y-%m-%d %H:%M:%S"));

    match job.last_check {
        Some(checked) => println!("  Last check:  {}", checked.format("%Y-%m-%d %H:%M:%S")),
        None => println!("  Last check:  {}", "never".dimmed()),
    }

    if let Some(info) = &job.info {
        let info = if job.state == JobState::Error {
            info.red()
        } else {
            info.normal()
        };
        println!("  Info:        {}", info);
    }

    if !job.params.is_empty() {
        println!("\n{}", "Parameters:".bold());
        let mut keys: Vec<&String> = job.params.keys().collect();
        keys.sort();
        for key in keys {
            println!("  {} = {}", key.cyan(), job.params[key]);
        }
    }
}

/// Colorize job state for display
pub(crate) fn colorize_state(state: JobState) -> ColoredString {
    let label = state.as_str();
    match state {
        JobState::New | JobState::Waiting => label.yellow(),
        JobState::Running | JobState::Ready => label.cyan(),
        JobState::Scheduled | JobState::Done => label.green(),
        JobState::Error => label.red(),
        JobState::Cancelled => label.dimmed(),
    }
}
