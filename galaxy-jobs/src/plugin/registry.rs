//! Plugin registry
//!
//! Holds the plugins enabled for this process. The set is fixed at startup
//! from a list of names; a name that is unknown, taken twice, or whose
//! plugin fails validation is logged and skipped without affecting the
//! rest.

use galaxy_core::domain::job::JobKind;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use super::data_transfer::DataTransferPlugin;
use super::http_transfer::HttpTransferPlugin;
use super::repository_update::RepositoryUpdatePlugin;
use super::shell_command::ShellCommandPlugin;
use super::workflow::WorkflowSchedulerPlugin;
use super::{JobPlugin, PluginDeps};

/// Names of every plugin this binary can construct
pub const BUILTIN_PLUGINS: &[&str] = &[
    super::data_transfer::NAME,
    super::shell_command::NAME,
    super::http_transfer::NAME,
    super::workflow::NAME,
    super::repository_update::NAME,
];

/// Why a plugin was not registered
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown plugin '{0}'")]
    Unknown(String),

    #[error("plugin '{0}' is already registered")]
    Duplicate(String),

    #[error("plugin '{name}' failed validation: {reason}")]
    Invalid { name: String, reason: String },
}

/// Constructs a built-in plugin by name
pub fn builtin(name: &str, deps: &PluginDeps) -> Result<Arc<dyn JobPlugin>, RegistryError> {
    let plugin: Arc<dyn JobPlugin> = match name {
        super::data_transfer::NAME => Arc::new(DataTransferPlugin::new(Arc::clone(&deps.store))),
        super::shell_command::NAME => Arc::new(ShellCommandPlugin::new(Arc::clone(&deps.shell))),
        super::http_transfer::NAME => Arc::new(HttpTransferPlugin::new()),
        super::workflow::NAME => Arc::new(WorkflowSchedulerPlugin::new()),
        super::repository_update::NAME => Arc::new(RepositoryUpdatePlugin::new(
            deps.config.repository_update_interval,
            deps.config.tool_shed_timeout,
        )),
        other => return Err(RegistryError::Unknown(other.to_string())),
    };
    Ok(plugin)
}

/// Plugins available to the poll loops, keyed by name
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn JobPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from configured plugin names
    ///
    /// Failures are logged and the offending plugin is skipped.
    pub fn from_names(names: &[String], deps: &PluginDeps) -> Self {
        let mut registry = Self::new();

        for name in names {
            let result = builtin(name, deps).and_then(|plugin| registry.register(plugin));
            match result {
                Ok(()) => info!("Loaded plugin '{}'", name),
                Err(e) => error!("Skipping plugin: {}", e),
            }
        }

        registry
    }

    /// Adds a plugin after validating it
    pub fn register(&mut self, plugin: Arc<dyn JobPlugin>) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();

        if name.trim().is_empty() {
            return Err(RegistryError::Invalid {
                name,
                reason: "plugin name is empty".to_string(),
            });
        }

        if self.plugins.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        plugin.validate().map_err(|e| RegistryError::Invalid {
            name: name.clone(),
            reason: format!("{:#}", e),
        })?;

        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobPlugin>> {
        self.plugins.get(name).cloned()
    }

    /// Plugins that handle `kind`
    pub fn for_kind(&self, kind: JobKind) -> impl Iterator<Item = &Arc<dyn JobPlugin>> {
        self.plugins.values().filter(move |p| p.kind() == kind)
    }

    /// Whether any registered plugin handles `kind`
    pub fn has_kind(&self, kind: JobKind) -> bool {
        self.for_kind(kind).next().is_some()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::shell::LocalShell;
    use anyhow::Result;
    use async_trait::async_trait;
    use galaxy_core::domain::job::Job;
    use galaxy_core::domain::outcome::{CheckOutcome, Transition};
    use galaxy_store::MemoryJobStore;

    struct BrokenPlugin;

    #[async_trait]
    impl JobPlugin for BrokenPlugin {
        fn name(&self) -> &str {
            "broken"
        }

        fn kind(&self) -> JobKind {
            JobKind::Deferred
        }

        fn validate(&self) -> Result<()> {
            anyhow::bail!("missing credentials")
        }

        async fn check_job(&self, _job: &Job) -> Result<CheckOutcome> {
            Ok(CheckOutcome::Ready)
        }

        async fn run_job(&self, _job: &Job) -> Result<Transition> {
            unreachable!()
        }
    }

    fn deps() -> PluginDeps {
        PluginDeps {
            config: Config::default(),
            store: Arc::new(MemoryJobStore::new()),
            shell: Arc::new(LocalShell::default()),
        }
    }

    #[test]
    fn test_from_names_loads_all_builtins() {
        let names: Vec<String> = BUILTIN_PLUGINS.iter().map(|s| s.to_string()).collect();
        let registry = PluginRegistry::from_names(&names, &deps());

        assert_eq!(registry.len(), BUILTIN_PLUGINS.len());
        for kind in JobKind::ALL {
            assert!(registry.has_kind(kind), "no plugin for {}", kind);
        }
    }

    #[test]
    fn test_from_names_skips_unknown_and_duplicates() {
        let names = vec![
            "shell".to_string(),
            "pacbio_smrt".to_string(),
            "shell".to_string(),
        ];
        let registry = PluginRegistry::from_names(&names, &deps());

        assert_eq!(registry.names(), vec!["shell"]);
        assert!(registry.get("pacbio_smrt").is_none());
        assert!(!registry.has_kind(JobKind::WorkflowInvocation));
    }

    #[test]
    fn test_register_rejects_invalid_plugin() {
        let mut registry = PluginRegistry::new();
        let err = registry.register(Arc::new(BrokenPlugin)).unwrap_err();

        assert!(matches!(err, RegistryError::Invalid { .. }));
        assert!(err.to_string().contains("missing credentials"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_builtin_unknown_name() {
        assert!(matches!(
            builtin("genome_transfer", &deps()),
            Err(RegistryError::Unknown(_))
        ));
    }
}
