//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod init;
mod job;
mod repository;

pub use init::InitCommands;
pub use job::JobCommands;
pub use repository::RepositoryCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Installed tool shed repositories
    Repository {
        #[command(subcommand)]
        command: RepositoryCommands,
    },
    /// Prepare the job database
    Init {
        #[command(subcommand)]
        command: InitCommands,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Repository { command } => {
            repository::handle_repository_command(command, config).await
        }
        Commands::Init { command } => init::handle_init_command(command, config).await,
    }
}
