//! Init command handlers
//!
//! Creates the job table and its indexes. Safe to run repeatedly.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;

use crate::config::Config;

/// Init subcommands
#[derive(Subcommand)]
pub enum InitCommands {
    /// Create the job table if it does not exist
    Db,
}

pub async fn handle_init_command(command: InitCommands, config: &Config) -> Result<()> {
    match command {
        InitCommands::Db => init_db(config).await,
    }
}

async fn init_db(config: &Config) -> Result<()> {
    let store = config.open_store().await?;
    galaxy_store::db::run_migrations(store.pool())
        .await
        .context("Failed to run migrations")?;

    println!("{}", "✓ Job database is ready".green().bold());
    Ok(())
}
