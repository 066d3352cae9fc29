//! Galaxy Job Daemon
//!
//! Runs the background loops that move jobs through their lifecycle.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Store: PostgreSQL when configured, in-memory otherwise
//! - Plugins: Built-in handlers registered by name at startup
//! - Scheduler: One poll loop per subsystem (deferred jobs, transfers,
//!   workflow scheduling, repository updates)
//!
//! Every loop shares a shutdown token that fires on Ctrl-C; the daemon
//! exits once all loops have stopped.

mod config;
mod context;
mod persister;
mod plugin;
mod scheduler;
mod shell;
mod sleeper;

use anyhow::{Context, Result};
use galaxy_store::{JobStore, MemoryJobStore, PgJobStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::context::AppContext;
use crate::plugin::PluginDeps;
use crate::plugin::registry::PluginRegistry;
use crate::scheduler::Poller;
use crate::shell::{LocalShell, SecureShell, Shell};
use crate::sleeper::ShutdownToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "galaxy_jobs=info,galaxy_toolshed=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Galaxy job daemon");

    let config = Config::from_env().context("Invalid configuration")?;
    config.validate()?;
    info!(
        "Loaded configuration: instance_id={}, subsystems={:?}",
        config.instance_id, config.subsystems
    );

    let store = open_store(&config).await?;

    let shell: Arc<dyn Shell> = match &config.ssh_host {
        Some(host) => {
            info!("Shell commands run on {}", host);
            let mut shell = SecureShell::new(host.clone(), config.shell_timeout);
            if let Some(user) = &config.ssh_user {
                shell = shell.with_user(user.clone());
            }
            Arc::new(shell)
        }
        None => Arc::new(LocalShell::new(config.shell_timeout)),
    };

    let deps = PluginDeps {
        config: config.clone(),
        store: Arc::clone(&store),
        shell,
    };
    let registry = PluginRegistry::from_names(&config.plugins, &deps);
    info!(
        "Registered {} plugin(s): {:?}",
        registry.len(),
        registry.names()
    );

    scheduler::check_subsystems(&config, &registry)?;

    let shutdown = ShutdownToken::new();
    let ctx = AppContext::new(config.clone(), store, registry, shutdown.clone());

    let mut handles = Vec::new();
    for subsystem in &config.subsystems {
        let poller = Poller::new(*subsystem, Arc::clone(&ctx));
        handles.push(tokio::spawn(async move { poller.run().await }));
    }

    info!("Daemon initialized with {} poll loop(s)", handles.len());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    shutdown.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Poll loop panicked: {}", e);
        }
    }

    info!("Galaxy job daemon stopped");
    Ok(())
}

/// Connects to PostgreSQL when a URL is configured, otherwise keeps jobs in memory
async fn open_store(config: &Config) -> Result<Arc<dyn JobStore>> {
    let Some(url) = &config.database_url else {
        warn!("DATABASE_URL not set, jobs are kept in memory and lost on exit");
        return Ok(Arc::new(MemoryJobStore::new()));
    };

    let pool = connect_with_retry(url).await?;
    galaxy_store::db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(Arc::new(PgJobStore::new(pool)))
}

/// Connect to the database with retry logic and exponential backoff
///
/// This handles the case where the database may not be ready yet when
/// the daemon starts (common in container environments).
async fn connect_with_retry(url: &str) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match galaxy_store::db::create_pool(url).await {
            Ok(pool) => {
                if attempt > 1 {
                    info!("Connected to database after {} attempt(s)", attempt);
                }
                return Ok(pool);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to connect to database after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Failed to connect to database: {}", e));
                }

                warn!(
                    "Failed to connect to database (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
