//! # Core Daemon
//!
//! Heavyweight initialization that runs concurrently with the transport:
//! working directories, pid file, graph driver, network driver, persisted
//! containers. Once it is built it installs the jobs that need daemon state
//! (`info`, `containers`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use job_engine::{Engine, EngineResult, Env, Install, Job, Status};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::graphdriver::{self, GraphDriver, HostProbe};
use crate::network;
use crate::pidfile::PidFile;
use crate::version::kernel_version;

pub const CONTAINERS_DIR: &str = "containers";
pub const GRAPH_DIR: &str = "graph";
pub const TMP_DIR: &str = "tmp";
pub const CONTAINER_CONFIG: &str = "config.json";

/// A container as persisted under `containers/<id>/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerRecord {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub image: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub state: ContainerState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    pub running: bool,
    pub pid: u32,
    pub exit_code: i32,
}

struct DaemonState {
    root: PathBuf,
    driver: GraphDriver,
    exec_driver: String,
    network_bridge: Option<String>,
    kernel_version: Option<String>,
    containers: RwLock<BTreeMap<String, ContainerRecord>>,
}

/// Initialized daemon state shared by the state-dependent jobs.
#[derive(Clone)]
pub struct CoreDaemon {
    inner: Arc<DaemonState>,
}

impl CoreDaemon {
    /// Prepare the daemon on `engine`, probing the running host.
    pub async fn new(config: &DaemonConfig, engine: &Engine) -> Result<Self, DaemonError> {
        Self::with_probe(config, engine, &HostProbe::from_host()).await
    }

    pub async fn with_probe(
        config: &DaemonConfig,
        engine: &Engine,
        probe: &HostProbe,
    ) -> Result<Self, DaemonError> {
        if engine.is_shutdown() {
            return Err(DaemonError::Job(job_engine::EngineError::Shutdown));
        }
        let root = prepare_root(&config.root)?;

        let pidfile = PidFile::create(&config.pidfile)?;
        remove_pidfile_on_shutdown(engine, pidfile)?;

        let driver = graphdriver::select(config.graph_driver.as_deref(), probe, &root)?;

        let network_bridge = if config.network.disabled {
            info!("Networking disabled");
            None
        } else {
            engine
                .run(
                    "init_networkdriver",
                    Vec::<String>::new(),
                    network::job_env(&config.network),
                )
                .await
                .into_result()
                .map_err(DaemonError::Job)?;
            Some(config.network.bridge_iface.clone())
        };

        let containers = load_containers(&root.join(CONTAINERS_DIR))?;
        info!(
            root = %root.display(),
            driver = %driver,
            containers = containers.len(),
            "Core daemon initialized"
        );

        Ok(Self {
            inner: Arc::new(DaemonState {
                root,
                driver,
                exec_driver: config.exec_driver.clone(),
                network_bridge,
                kernel_version: kernel_version(Path::new("/proc/sys/kernel/osrelease")),
                containers: RwLock::new(containers),
            }),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    #[must_use]
    pub fn driver(&self) -> GraphDriver {
        self.inner.driver
    }

    #[must_use]
    pub fn containers(&self) -> Vec<ContainerRecord> {
        self.inner.containers.read().values().cloned().collect()
    }

    fn info(&self, job: &mut Job) -> Status {
        let state = &self.inner;
        let mut v = Env::new();
        v.set_int("Containers", state.containers.read().len() as i64);
        v.set("Driver", state.driver.name());
        v.set("ExecutionDriver", state.exec_driver.as_str());
        v.set("Root", state.root.display().to_string());
        v.set(
            "NetworkBridge",
            state.network_bridge.clone().unwrap_or_default(),
        );
        v.set(
            "KernelVersion",
            state.kernel_version.clone().unwrap_or_default(),
        );
        v.set_int("NCPU", num_cpus::get() as i64);
        match v.encode(job.stdout.clone()) {
            Ok(()) => Status::Ok,
            Err(e) => job.error(e),
        }
    }

    /// `containers`: JSON array of records, running only unless env `all`.
    fn list(&self, job: &mut Job) -> Status {
        let all = match job.getenv_bool("all") {
            Ok(all) => all.unwrap_or(false),
            Err(e) => return job.error(e),
        };
        let records: Vec<ContainerRecord> = self
            .inner
            .containers
            .read()
            .values()
            .filter(|c| all || c.state.running)
            .cloned()
            .collect();
        match serde_json::to_writer(job.stdout.clone(), &records) {
            Ok(()) => Status::Ok,
            Err(e) => job.error(e),
        }
    }
}

impl Install for CoreDaemon {
    fn install(&self, engine: &Engine) -> EngineResult<()> {
        let daemon = self.clone();
        engine.register_fn("info", move |job| daemon.info(job))?;
        let daemon = self.clone();
        engine.register_fn("containers", move |job| daemon.list(job))?;
        info!("[CoreDaemon] Installed info, containers");
        Ok(())
    }
}

/// Create the root (mode 0700) and its fixed subdirectories.
fn prepare_root(root: &Path) -> Result<PathBuf, DaemonError> {
    create_private_dir(root)?;
    let root = root.canonicalize().map_err(DaemonError::io(root))?;
    for sub in [CONTAINERS_DIR, GRAPH_DIR, TMP_DIR] {
        create_private_dir(&root.join(sub))?;
    }
    Ok(root)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
        .map_err(DaemonError::io(path))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(DaemonError::io(path))
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> Result<(), DaemonError> {
    fs::create_dir_all(path).map_err(DaemonError::io(path))
}

/// Load every readable record below `dir`. Broken entries are skipped.
fn load_containers(dir: &Path) -> Result<BTreeMap<String, ContainerRecord>, DaemonError> {
    let mut containers = BTreeMap::new();
    for entry in fs::read_dir(dir).map_err(DaemonError::io(dir))? {
        let entry = entry.map_err(DaemonError::io(dir))?;
        let id = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path().join(CONTAINER_CONFIG);

        let record = match fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_slice::<ContainerRecord>(&raw).map_err(|e| e.to_string())
            }) {
            Ok(record) => record,
            Err(e) => {
                warn!(container = %id, error = %e, "Skipping unreadable container");
                continue;
            }
        };
        if record.id != id {
            warn!(container = %id, recorded = %record.id, "Skipping container with mismatched ID");
            continue;
        }
        containers.insert(id, record);
    }
    Ok(containers)
}

/// Hand the pid file to a shutdown hook, or remove it now if shutdown won
/// the race.
fn remove_pidfile_on_shutdown(engine: &Engine, pidfile: PidFile) -> Result<(), DaemonError> {
    let pidfile = Arc::new(pidfile);
    let hooked = Arc::clone(&pidfile);
    let accepted = engine.on_shutdown(move || async move {
        if let Err(e) = hooked.remove() {
            warn!(path = %hooked.path().display(), error = %e, "Failed to remove pid file");
        }
    });
    if accepted {
        return Ok(());
    }
    if let Err(e) = pidfile.remove() {
        warn!(path = %pidfile.path().display(), error = %e, "Failed to remove pid file");
    }
    Err(DaemonError::Job(job_engine::EngineError::Shutdown))
}
