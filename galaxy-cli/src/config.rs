//! Configuration module
//!
//! Holds the database location and opens the job store from it.

use anyhow::{Context, Result};
use galaxy_store::PgJobStore;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the job database
    pub database_url: String,
}

impl Config {
    /// Connects to the job database
    pub async fn open_store(&self) -> Result<PgJobStore> {
        let pool = galaxy_store::db::create_pool(&self.database_url)
            .await
            .with_context(|| format!("Failed to connect to {}", self.database_url))?;
        Ok(PgJobStore::new(pool))
    }
}
