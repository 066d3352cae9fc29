//! Daemon configuration
//!
//! Defines the poll intervals, enabled subsystems and plugins, and the
//! timeouts applied to shell commands and tool shed calls.

use std::time::Duration;

use crate::plugin::registry::BUILTIN_PLUGINS;
use crate::scheduler::Subsystem;

/// Job daemon configuration
///
/// Every interval is configurable so a development instance can poll
/// quickly while production keeps the defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifies this process in logs
    pub instance_id: String,

    /// PostgreSQL URL; without one jobs live in memory only
    pub database_url: Option<String>,

    /// How often the deferred job queue polls
    pub deferred_interval: Duration,

    /// How often the transfer manager polls
    pub transfer_interval: Duration,

    /// How often workflow invocations are scheduled
    pub workflow_interval: Duration,

    /// How often installed repositories are checked for updates
    pub repository_update_interval: Duration,

    /// Maximum run time of a shell command before its process group is killed
    pub shell_timeout: Duration,

    /// Request timeout for tool shed calls
    pub tool_shed_timeout: Duration,

    /// Run shell commands on this host over ssh instead of locally
    pub ssh_host: Option<String>,

    /// Remote user for `ssh_host`
    pub ssh_user: Option<String>,

    /// Names of the plugins to register at startup
    pub plugins: Vec<String>,

    /// Poll loops to start
    pub subsystems: Vec<Subsystem>,
}

impl Config {
    /// Creates a configuration with defaults
    pub fn new(instance_id: String) -> Self {
        Self {
            instance_id,
            database_url: None,
            deferred_interval: Duration::from_secs(1),
            transfer_interval: Duration::from_secs(1),
            workflow_interval: Duration::from_secs(1),
            repository_update_interval: Duration::from_secs(24 * 60 * 60),
            shell_timeout: Duration::from_secs(60),
            tool_shed_timeout: Duration::from_secs(30),
            ssh_host: None,
            ssh_user: None,
            plugins: BUILTIN_PLUGINS.iter().map(|p| p.to_string()).collect(),
            subsystems: Subsystem::ALL.to_vec(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognised variables (all optional):
    /// - GALAXY_INSTANCE_ID (default: random UUID)
    /// - DATABASE_URL
    /// - DEFERRED_POLL_INTERVAL, TRANSFER_POLL_INTERVAL, WORKFLOW_POLL_INTERVAL (seconds, default: 1)
    /// - REPOSITORY_UPDATE_HOURS (default: 24)
    /// - SHELL_TIMEOUT (seconds, default: 60)
    /// - TOOL_SHED_TIMEOUT (seconds, default: 30)
    /// - GALAXY_SSH_HOST, GALAXY_SSH_USER (default: run commands locally)
    /// - GALAXY_JOB_PLUGINS (comma separated, default: all built-in plugins)
    /// - GALAXY_SUBSYSTEMS (comma separated, default: all subsystems)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let instance_id = lookup("GALAXY_INSTANCE_ID")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut config = Self::new(instance_id);

        config.database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());
        config.ssh_host = lookup("GALAXY_SSH_HOST").filter(|s| !s.trim().is_empty());
        config.ssh_user = lookup("GALAXY_SSH_USER").filter(|s| !s.trim().is_empty());

        let secs = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| anyhow::anyhow!("{} must be a whole number of seconds, got '{}'", key, raw)),
                None => Ok(default),
            }
        };

        config.deferred_interval = secs("DEFERRED_POLL_INTERVAL", config.deferred_interval)?;
        config.transfer_interval = secs("TRANSFER_POLL_INTERVAL", config.transfer_interval)?;
        config.workflow_interval = secs("WORKFLOW_POLL_INTERVAL", config.workflow_interval)?;
        config.shell_timeout = secs("SHELL_TIMEOUT", config.shell_timeout)?;
        config.tool_shed_timeout = secs("TOOL_SHED_TIMEOUT", config.tool_shed_timeout)?;

        if let Some(raw) = lookup("REPOSITORY_UPDATE_HOURS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|hours| hours.checked_mul(60 * 60))
                .ok_or_else(|| {
                    anyhow::anyhow!("REPOSITORY_UPDATE_HOURS must be a whole number, got '{}'", raw)
                })?;
            config.repository_update_interval = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("GALAXY_JOB_PLUGINS") {
            config.plugins = split_list(&raw);
        }

        if let Some(raw) = lookup("GALAXY_SUBSYSTEMS") {
            config.subsystems = split_list(&raw)
                .iter()
                .map(|s| s.parse::<Subsystem>())
                .collect::<Result<_, _>>()?;
        }

        Ok(config)
    }

    /// Poll interval of a subsystem's loop
    pub fn interval_for(&self, subsystem: Subsystem) -> Duration {
        match subsystem {
            Subsystem::DeferredJobs => self.deferred_interval,
            Subsystem::Transfers => self.transfer_interval,
            Subsystem::WorkflowScheduling => self.workflow_interval,
            Subsystem::RepositoryUpdates => self.repository_update_interval,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.instance_id.is_empty() {
            anyhow::bail!("instance_id cannot be empty");
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                anyhow::bail!("database_url must start with postgres:// or postgresql://");
            }
        }

        for subsystem in Subsystem::ALL {
            if self.interval_for(subsystem).is_zero() {
                anyhow::bail!("poll interval for {} must be greater than 0", subsystem);
            }
        }

        if self.shell_timeout.is_zero() {
            anyhow::bail!("shell_timeout must be greater than 0");
        }

        if self.tool_shed_timeout.is_zero() {
            anyhow::bail!("tool_shed_timeout must be greater than 0");
        }

        if self.subsystems.is_empty() {
            anyhow::bail!("at least one subsystem must be enabled");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
