//! Settings carried by a `serveapi` invocation.
//!
//! Positional arguments are `PROTO://ADDR` listen addresses. Everything else
//! comes from the job environment under the keys below.

use std::fmt;
use std::path::{Path, PathBuf};

use job_engine::Job;

use crate::error::TransportError;

pub const LOGGING: &str = "Logging";
pub const ENABLE_CORS: &str = "EnableCors";
pub const VERSION: &str = "Version";
pub const SOCKET_GROUP: &str = "SocketGroup";
pub const TLS: &str = "Tls";
pub const TLS_VERIFY: &str = "TlsVerify";
pub const TLS_CA: &str = "TlsCa";
pub const TLS_CERT: &str = "TlsCert";
pub const TLS_KEY: &str = "TlsKey";
pub const BUFFER_REQUESTS: &str = "BufferRequests";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Tcp,
    Unix,
    Fd,
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::Unix => "unix",
            Self::Fd => "fd",
        })
    }
}

/// One `PROTO://ADDR` listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    pub proto: Proto,
    pub addr: String,
}

impl ListenAddr {
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let (proto, addr) = raw
            .split_once("://")
            .ok_or_else(|| TransportError::InvalidAddress(raw.to_string()))?;
        let proto = match proto {
            "tcp" => Proto::Tcp,
            "unix" => Proto::Unix,
            "fd" => Proto::Fd,
            other => return Err(TransportError::UnsupportedProtocol(other.to_string())),
        };
        if addr.is_empty() && proto != Proto::Fd {
            return Err(TransportError::InvalidAddress(raw.to_string()));
        }
        Ok(Self {
            proto,
            addr: addr.to_string(),
        })
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.proto, self.addr)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub enabled: bool,
    pub verify: bool,
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl TlsSettings {
    /// Whether any form of TLS was requested.
    #[must_use]
    pub fn requested(&self) -> bool {
        self.enabled || self.verify
    }

    /// Check that the files a TLS listener would need are configured and present.
    pub fn validate(&self) -> Result<(), TransportError> {
        if !self.requested() {
            return Ok(());
        }
        require_file(TLS_CERT, self.cert.as_deref())?;
        require_file(TLS_KEY, self.key.as_deref())?;
        if self.verify {
            require_file(TLS_CA, self.ca.as_deref())?;
        }
        Ok(())
    }
}

fn require_file(setting: &'static str, path: Option<&Path>) -> Result<(), TransportError> {
    let path = path.ok_or(TransportError::TlsSettingMissing(setting))?;
    if !path.exists() {
        return Err(TransportError::TlsFileMissing {
            setting,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeApiConfig {
    pub hosts: Vec<ListenAddr>,
    pub logging: bool,
    pub enable_cors: bool,
    pub version: Option<String>,
    pub socket_group: Option<String>,
    pub tls: TlsSettings,
    /// Hold accepted connections until the readiness gate opens instead of
    /// answering them with 503.
    pub buffer_requests: bool,
}

impl ServeApiConfig {
    pub fn from_job(job: &Job) -> Result<Self, TransportError> {
        if job.args().is_empty() {
            return Err(TransportError::Usage);
        }
        let hosts = job
            .args()
            .iter()
            .map(|arg| ListenAddr::parse(arg))
            .collect::<Result<Vec<_>, _>>()?;

        let path = |key: &str| job.getenv(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        Ok(Self {
            hosts,
            logging: job.getenv_bool(LOGGING)?.unwrap_or(false),
            enable_cors: job.getenv_bool(ENABLE_CORS)?.unwrap_or(false),
            version: job.getenv(VERSION).filter(|v| !v.is_empty()),
            socket_group: job.getenv(SOCKET_GROUP).filter(|v| !v.is_empty()),
            tls: TlsSettings {
                enabled: job.getenv_bool(TLS)?.unwrap_or(false),
                verify: job.getenv_bool(TLS_VERIFY)?.unwrap_or(false),
                ca: path(TLS_CA),
                cert: path(TLS_CERT),
                key: path(TLS_KEY),
            },
            buffer_requests: job.getenv_bool(BUFFER_REQUESTS)?.unwrap_or(false),
        })
    }
}
