//! Repository command handlers
//!
//! Installed tool shed repositories are tracked as `done` jobs that the
//! daemon's update loop revisits. These commands register repositories,
//! show the last status the loop stored, and query a tool shed directly.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::*;
use galaxy_core::domain::job::{Job, JobKind, JobState};
use galaxy_core::domain::outcome::Transition;
use galaxy_core::domain::toolshed::{RepositoryRef, RepositoryStatus};
use galaxy_core::dto::job::{CreateJob, JobFilter};
use galaxy_store::JobStore;
use galaxy_toolshed::ToolShedClient;
use std::time::Duration;

use crate::config::Config;

const PLUGIN: &str = "tool_shed_update";

/// Identifies an installed repository revision
#[derive(Args)]
pub struct RepositoryArgs {
    /// Base URL of the tool shed
    #[arg(long, default_value = "https://toolshed.g2.bx.psu.edu")]
    tool_shed_url: String,

    #[arg(long)]
    name: String,

    #[arg(long)]
    owner: String,

    /// Installed changeset revision
    #[arg(long)]
    revision: String,
}

impl RepositoryArgs {
    fn repository(&self) -> RepositoryRef {
        RepositoryRef {
            name: self.name.clone(),
            owner: self.owner.clone(),
            changeset_revision: self.revision.clone(),
        }
    }
}

/// Repository subcommands
#[derive(Subcommand)]
pub enum RepositoryCommands {
    /// Track an installed repository for update checks
    Track(RepositoryArgs),
    /// Show the stored update status of tracked repositories
    List,
    /// Ask the tool shed for a repository's status right now
    Check {
        #[command(flatten)]
        repo: RepositoryArgs,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

pub async fn handle_repository_command(command: RepositoryCommands, config: &Config) -> Result<()> {
    match command {
        RepositoryCommands::Track(args) => {
            let store = config.open_store().await?;
            track_repository(&store, &args).await
        }
        RepositoryCommands::List => {
            let store = config.open_store().await?;
            list_repositories(&store).await
        }
        RepositoryCommands::Check { repo, timeout } => check_repository(&repo, timeout).await,
    }
}

/// Creates the repository job directly in `done`, the state the update loop polls
async fn track_repository(store: &dyn JobStore, args: &RepositoryArgs) -> Result<()> {
    let req = CreateJob::new(JobKind::ToolShedRepository, PLUGIN)
        .with_param("tool_shed_url", serde_json::json!(args.tool_shed_url))
        .with_param("name", serde_json::json!(args.name))
        .with_param("owner", serde_json::json!(args.owner))
        .with_param("changeset_revision", serde_json::json!(args.revision));

    let job = store.create(req).await?;
    store
        .update_state(
            job.id,
            &Transition::to(JobState::Done).with_info("installed"),
        )
        .await?;

    println!(
        "{} Tracking {}/{} at {} ({})",
        "✓".green(),
        args.owner,
        args.name.bold(),
        args.revision,
        job.id.to_string().dimmed()
    );
    Ok(())
}

async fn list_repositories(store: &dyn JobStore) -> Result<()> {
    let filter = JobFilter {
        kind: Some(JobKind::ToolShedRepository),
        state: None,
    };
    let repos = store.list(&filter).await?;

    if repos.is_empty() {
        println!("{}", "No repositories tracked.".yellow());
        return Ok(());
    }

    println!("{}", format!("Tracking {} repository(ies):", repos.len()).bold());
    println!();
    for job in repos {
        print_repository(&job);
    }
    Ok(())
}

async fn check_repository(args: &RepositoryArgs, timeout: u64) -> Result<()> {
    let client = ToolShedClient::with_timeout(&args.tool_shed_url, Duration::from_secs(timeout))?;
    let repo = args.repository();

    let status = client
        .status_for_installed_repository(&repo)
        .await
        .with_context(|| format!("Failed to query {}", client.base_url()))?;

    println!("{}/{} at {}", repo.owner, repo.name.bold(), repo.changeset_revision);
    print_status(&status);

    if status.has_update() {
        if let Some(next) = client.next_installable_changeset_revision(&repo).await? {
            println!("    Next revision:      {}", next.green());
        }
    }
    Ok(())
}

fn print_repository(job: &Job) {
    let param = |key: &str| job.param_str(key).unwrap_or("?").to_string();

    println!(
        "  {} {}/{} at {}",
        "▸".cyan(),
        param("owner"),
        param("name").bold(),
        param("changeset_revision")
    );
    println!("    Tool shed: {}", param("tool_shed_url").dimmed());

    match job
        .params
        .get("tool_shed_status")
        .cloned()
        .map(serde_json::from_value::<RepositoryStatus>)
    {
        Some(Ok(status)) => print_status(&status),
        Some(Err(_)) => println!("    {}", "Stored status is unreadable".red()),
        None => println!("    {}", "Not checked yet".dimmed()),
    }

    if let Some(checked) = job.last_check {
        println!(
            "    Checked:   {}",
            checked.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    println!();
}

fn print_status(status: &RepositoryStatus) {
    let flag = |set: bool| if set { "yes".green() } else { "no".dimmed() };

    println!("    Latest installable: {}", flag(status.latest_installable_revision));
    println!("    Revision update:    {}", flag(status.revision_update));
    println!("    Revision upgrade:   {}", flag(status.revision_upgrade));
    if status.repository_deprecated {
        println!("    {}", "Deprecated".red().bold());
    }
}
