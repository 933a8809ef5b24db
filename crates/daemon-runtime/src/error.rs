//! Daemon errors.
//!
//! Everything here is fatal: the daemon is either fully capable or not
//! running.

use std::io;
use std::path::PathBuf;

use job_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration file: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("failed to initialize logging: {0}")]
    Telemetry(String),

    #[error("failed to install jobs: {0}")]
    Boot(#[source] EngineError),

    #[error("core initialization failed: {0}")]
    CoreInit(#[source] Box<DaemonError>),

    #[error("job failed: {0}")]
    Job(#[source] EngineError),

    #[error("pid file {path:?} names running process {pid}; is another daemon running?")]
    PidFile { path: PathBuf, pid: u32 },

    #[error("graph driver: {0}")]
    Driver(String),

    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DaemonError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
