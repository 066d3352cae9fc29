//! Application context
//!
//! Everything the poll loops share, created once at startup and handed to
//! each loop explicitly.

use galaxy_store::JobStore;
use std::sync::Arc;

use crate::config::Config;
use crate::plugin::registry::PluginRegistry;
use crate::sleeper::ShutdownToken;

pub struct AppContext {
    pub config: Config,

    /// Job persistence shared by every loop and plugin
    pub store: Arc<dyn JobStore>,

    pub registry: PluginRegistry,

    /// Fired once to stop every loop
    pub shutdown: ShutdownToken,
}

impl AppContext {
    pub fn new(
        config: Config,
        store: Arc<dyn JobStore>,
        registry: PluginRegistry,
        shutdown: ShutdownToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            registry,
            shutdown,
        })
    }
}
