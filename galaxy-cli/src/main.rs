//! Galaxy CLI
//!
//! Command-line interface for producing and inspecting background jobs.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "galaxy")]
#[command(about = "Galaxy background job CLI", long_about = None)]
struct Cli {
    /// PostgreSQL URL of the job database
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://galaxy@localhost/galaxy"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        database_url: cli.database_url,
    };

    handle_command(cli.command, &config).await
}
