//! # Builtins
//!
//! The fixed install order that makes up the daemon's job surface:
//!
//! 1. `init_networkdriver`
//! 2. remote API: `serveapi`, `acceptconnections`
//! 3. events: `log`, `events`, `subscribers_count`
//! 4. `version`
//! 5. registry: `auth`, `search`
//!
//! The first failure aborts. Installing twice on one engine fails with
//! `DuplicateName`.

use std::sync::Arc;

use api_server::ApiService;
use event_log::EventsService;
use index_client::{HttpIndexClient, IndexClient, RegistryService};
use job_engine::{Engine, EngineResult, Install};
use tracing::info;

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::network;
use crate::version::{VersionInfo, VersionJob};

/// Every feature module installed at boot.
#[derive(Clone)]
pub struct Builtins {
    pub version: VersionInfo,
    pub api: ApiService,
    pub events: EventsService,
    pub registry: RegistryService,
}

impl Builtins {
    pub fn from_config(config: &DaemonConfig) -> Result<Self, DaemonError> {
        let index = HttpIndexClient::new(config.index_server.as_str())
            .map_err(|e| DaemonError::Config(format!("index_server: {e}")))?;
        Ok(Self::with_index(Arc::new(index), VersionInfo::current()))
    }

    #[must_use]
    pub fn with_index(index: Arc<dyn IndexClient>, version: VersionInfo) -> Self {
        Self {
            version,
            api: ApiService::new(),
            events: EventsService::new(),
            registry: RegistryService::new(index),
        }
    }
}

impl Install for Builtins {
    fn install(&self, engine: &Engine) -> EngineResult<()> {
        engine.register_fn("init_networkdriver", network::init_networkdriver)?;
        self.api.install(engine)?;
        self.events.install(engine)?;
        engine.register("version", VersionJob::new(self.version.clone()))?;
        self.registry.install(engine)?;
        info!(jobs = engine.commands().len(), "Builtins installed");
        Ok(())
    }
}

/// Install `builtins` on `engine`.
pub fn register(engine: &Engine, builtins: &Builtins) -> EngineResult<()> {
    builtins.install(engine)
}
