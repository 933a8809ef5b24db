//! # Lifecycle Controller
//!
//! ```text
//! Booting ──► CoreInitializing ──► Ready ──► ShuttingDown ──► Stopped
//!                │        ▲
//!                │        └── core-init task: CoreDaemon → install → acceptconnections
//!                └── main path: serveapi (buffering until acceptconnections)
//! ```
//!
//! Booting installs every builtin synchronously; any failure there is fatal
//! before anything serves. `run` then forks: the one background task
//! builds the core daemon while the main path runs `serveapi`. A failed
//! core init is fatal. Shutdown is the only cancellation: it drains the
//! engine, then gives the init task the grace period before aborting it.

use std::sync::Arc;

use api_server::config as api_env;
use job_engine::{Engine, EngineConfig, Install, Job, JobOutcome};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::builtins::{self, Builtins};
use crate::config::DaemonConfig;
use crate::daemon::CoreDaemon;
use crate::error::DaemonError;
use crate::graphdriver::HostProbe;
use crate::signal::ShutdownTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Booting,
    CoreInitializing,
    Ready,
    ShuttingDown,
    Stopped,
}

/// Owns the engine and drives the daemon through its states.
#[derive(Clone)]
pub struct Lifecycle {
    config: Arc<DaemonConfig>,
    engine: Engine,
    version: String,
    probe: Option<Arc<HostProbe>>,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    /// Build the engine and install the builtins for `config`.
    pub fn boot(config: DaemonConfig) -> Result<Self, DaemonError> {
        let builtins = Builtins::from_config(&config)?;
        Self::boot_with(config, &builtins)
    }

    pub fn boot_with(config: DaemonConfig, builtins: &Builtins) -> Result<Self, DaemonError> {
        let (state, _) = watch::channel(LifecycleState::Booting);
        info!(version = %builtins.version.version, "Booting dockyard");

        let engine = Engine::with_config(EngineConfig {
            job_grace_period: config.shutdown_grace(),
            ..EngineConfig::default()
        });
        builtins::register(&engine, builtins).map_err(DaemonError::Boot)?;

        Ok(Self {
            config: Arc::new(config),
            engine,
            version: builtins.version.version.clone(),
            probe: None,
            state: Arc::new(state),
        })
    }

    /// Use `probe` for graph driver selection instead of the host tables.
    #[must_use]
    pub fn with_host_probe(mut self, probe: HostProbe) -> Self {
        self.probe = Some(Arc::new(probe));
        self
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// States only move forward.
    fn advance(&self, next: LifecycleState) {
        let moved = self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            info!(state = ?next, "Lifecycle state changed");
        }
    }

    /// Serve until shutdown or a fatal error.
    pub async fn run(&self) -> Result<(), DaemonError> {
        self.advance(LifecycleState::CoreInitializing);

        let (fatal_tx, mut fatal_rx) = oneshot::channel();
        let mut init = tokio::spawn(self.clone().core_init(fatal_tx));

        let serve = self.serveapi_job().run();
        tokio::pin!(serve);

        let mut failure = None;
        let finished = tokio::select! {
            outcome = &mut serve => Some(outcome),
            Ok(err) = &mut fatal_rx => {
                error!(error = %err, "Fatal error during core initialization");
                failure = Some(err);
                None
            }
        };

        // The transport only stops once the engine is shutting down, so keep
        // polling it while the shutdown drains in-flight jobs.
        let served: JobOutcome = match finished {
            Some(outcome) => {
                self.shutdown().await;
                outcome
            }
            None => tokio::join!(self.shutdown(), &mut serve).1,
        };

        if tokio::time::timeout(self.config.shutdown_grace(), &mut init)
            .await
            .is_err()
        {
            warn!("Core initialization still running after grace period; aborting it");
            init.abort();
        }

        self.advance(LifecycleState::Stopped);
        info!("Daemon stopped");

        if let Some(err) = failure {
            return Err(err);
        }
        served.into_result().map_err(DaemonError::Job)?;
        Ok(())
    }

    /// Start shutdown; later calls wait for the first to complete.
    pub async fn shutdown(&self) {
        self.advance(LifecycleState::ShuttingDown);
        self.engine.shutdown().await;
    }

    /// Shutdown callback for the signal trap.
    #[must_use]
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        let lifecycle = self.clone();
        ShutdownTrigger::new(move || {
            let lifecycle = lifecycle.clone();
            Box::pin(async move { lifecycle.shutdown().await })
        })
    }

    async fn core_init(self, fatal: oneshot::Sender<DaemonError>) {
        match self.init_core().await {
            Ok(_) => self.advance(LifecycleState::Ready),
            Err(e) if self.engine.is_shutdown() => {
                debug!(error = %e, "Core initialization interrupted by shutdown");
            }
            Err(e) => {
                let _ = fatal.send(DaemonError::CoreInit(Box::new(e)));
            }
        }
    }

    async fn init_core(&self) -> Result<CoreDaemon, DaemonError> {
        let daemon = match &self.probe {
            Some(probe) => CoreDaemon::with_probe(&self.config, &self.engine, probe).await?,
            None => CoreDaemon::new(&self.config, &self.engine).await?,
        };
        daemon.install(&self.engine).map_err(DaemonError::Boot)?;

        self.engine
            .run("acceptconnections", Vec::<String>::new(), Default::default())
            .await
            .into_result()
            .map_err(DaemonError::Job)?;
        Ok(daemon)
    }

    fn serveapi_job(&self) -> Job {
        let api = &self.config.api;
        let mut job = self
            .engine
            .job("serveapi")
            .with_args(self.config.hosts.iter().cloned());

        job.setenv_bool(api_env::LOGGING, api.logging);
        job.setenv_bool(api_env::ENABLE_CORS, api.enable_cors);
        job.setenv(api_env::VERSION, self.version.as_str());
        if let Some(group) = &api.socket_group {
            job.setenv(api_env::SOCKET_GROUP, group.as_str());
        }
        job.setenv_bool(api_env::TLS, api.tls);
        job.setenv_bool(api_env::TLS_VERIFY, api.tls_verify);
        for (key, path) in [
            (api_env::TLS_CA, &api.tls_ca),
            (api_env::TLS_CERT, &api.tls_cert),
            (api_env::TLS_KEY, &api.tls_key),
        ] {
            if let Some(path) = path {
                job.setenv(key, path.display().to_string());
            }
        }
        job.setenv_bool(api_env::BUFFER_REQUESTS, true);
        job
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serveapi_job_logs_and_buffers_by_default() {
        let lifecycle = Lifecycle::boot(DaemonConfig::default()).unwrap();
        let job = lifecycle.serveapi_job();

        assert_eq!(job.args().to_vec(), vec![crate::config::DEFAULT_HOST.to_string()]);
        assert_eq!(job.getenv_bool(api_env::LOGGING).unwrap(), Some(true));
        assert_eq!(job.getenv_bool(api_env::BUFFER_REQUESTS).unwrap(), Some(true));
        assert_eq!(job.getenv_bool(api_env::TLS).unwrap(), Some(false));
    }
}
