//! Transport errors.

use std::io;
use std::path::PathBuf;

use job_engine::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("usage: serveapi PROTO://ADDR [PROTO://ADDR ...]")]
    Usage,

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("protocol {0:?} is not supported by this transport")]
    UnsupportedProtocol(String),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("{0} must be set when TLS is enabled")]
    TlsSettingMissing(&'static str),

    #[error("{setting} file {path:?} does not exist")]
    TlsFileMissing {
        setting: &'static str,
        path: PathBuf,
    },

    #[error("TLS termination is not built into this transport; put a TLS proxy in front of it")]
    TlsUnsupported,

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("API listener task failed: {0}")]
    Listener(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
