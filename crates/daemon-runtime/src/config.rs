//! # Daemon Configuration
//!
//! Defaults, optionally a TOML file named by `DOCKYARD_CONFIG`, then
//! `DOCKYARD_*` environment overrides, then [`DaemonConfig::validate`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use job_engine::parse_bool;
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;
use crate::graphdriver::GraphDriver;
use crate::telemetry::LogConfig;

pub const DEFAULT_HOST: &str = "tcp://127.0.0.1:2375";

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Root of all persistent daemon state.
    pub root: PathBuf,
    pub pidfile: PathBuf,
    /// `PROTO://ADDR` listen addresses handed to `serveapi`.
    pub hosts: Vec<String>,
    /// Forced graph driver; probed when unset.
    pub graph_driver: Option<String>,
    pub exec_driver: String,
    pub index_server: String,
    /// How long shutdown waits for in-flight jobs and core initialization.
    pub shutdown_grace_secs: u64,
    pub api: ApiConfig,
    pub network: NetworkConfig,
    pub log: LogConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/dockyard"),
            pidfile: PathBuf::from("/var/run/dockyard.pid"),
            hosts: vec![DEFAULT_HOST.to_string()],
            graph_driver: None,
            exec_driver: "native".to_string(),
            index_server: index_client::DEFAULT_INDEX_SERVER.to_string(),
            shutdown_grace_secs: 5,
            api: ApiConfig::default(),
            network: NetworkConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Remote API settings passed to `serveapi` through its env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Request tracing on the API router. On unless turned off.
    pub logging: bool,
    pub enable_cors: bool,
    pub socket_group: Option<String>,
    pub tls: bool,
    pub tls_verify: bool,
    pub tls_ca: Option<PathBuf>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            logging: true,
            enable_cors: false,
            socket_group: None,
            tls: false,
            tls_verify: false,
            tls_ca: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

/// Bridge settings passed to `init_networkdriver`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Skip network driver initialization entirely.
    pub disabled: bool,
    pub bridge_iface: String,
    /// CIDR for the bridge, e.g. `172.17.42.1/16`.
    pub bridge_ip: Option<String>,
    pub default_binding_ip: String,
    pub enable_iptables: bool,
    pub enable_ip_forward: bool,
    pub inter_container_communication: bool,
    pub mtu: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            bridge_iface: "docker0".to_string(),
            bridge_ip: None,
            default_binding_ip: "0.0.0.0".to_string(),
            enable_iptables: true,
            enable_ip_forward: true,
            inter_container_communication: true,
            mtu: 1500,
        }
    }
}

impl DaemonConfig {
    /// Load from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `DOCKYARD_CONFIG`: TOML file read before any other override
    /// - `DOCKYARD_ROOT`, `DOCKYARD_PIDFILE`
    /// - `DOCKYARD_HOSTS`: comma-separated `PROTO://ADDR` list
    /// - `DOCKYARD_GRAPH_DRIVER`, `DOCKYARD_EXEC_DRIVER`, `DOCKYARD_INDEX_SERVER`
    /// - `DOCKYARD_API_LOGGING`, `DOCKYARD_ENABLE_CORS`, `DOCKYARD_SOCKET_GROUP`
    /// - `DOCKYARD_TLS`, `DOCKYARD_TLS_VERIFY`, `DOCKYARD_TLS_CA`,
    ///   `DOCKYARD_TLS_CERT`, `DOCKYARD_TLS_KEY`
    /// - `DOCKYARD_DISABLE_NETWORK`, `DOCKYARD_BRIDGE`, `DOCKYARD_BRIDGE_IP`,
    ///   `DOCKYARD_IP`, `DOCKYARD_IPTABLES`, `DOCKYARD_IP_FORWARD`,
    ///   `DOCKYARD_ICC`, `DOCKYARD_MTU`
    /// - `DOCKYARD_LOG_LEVEL`, `DOCKYARD_JSON_LOGS`
    /// - `DOCKYARD_SHUTDOWN_GRACE_SECS`
    pub fn from_env() -> Result<Self, DaemonError> {
        let mut config = match std::env::var_os("DOCKYARD_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                let raw = std::fs::read_to_string(&path).map_err(DaemonError::io(&path))?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, DaemonError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `DOCKYARD_*` overrides read through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), DaemonError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(v) = get("DOCKYARD_ROOT") {
            self.root = PathBuf::from(v);
        }
        if let Some(v) = get("DOCKYARD_PIDFILE") {
            self.pidfile = PathBuf::from(v);
        }
        if let Some(v) = get("DOCKYARD_HOSTS") {
            self.hosts = v
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("DOCKYARD_GRAPH_DRIVER") {
            self.graph_driver = Some(v);
        }
        if let Some(v) = get("DOCKYARD_EXEC_DRIVER") {
            self.exec_driver = v;
        }
        if let Some(v) = get("DOCKYARD_INDEX_SERVER") {
            self.index_server = v;
        }
        if let Some(v) = get("DOCKYARD_SHUTDOWN_GRACE_SECS") {
            self.shutdown_grace_secs = parse_number("DOCKYARD_SHUTDOWN_GRACE_SECS", &v)?;
        }

        if let Some(v) = get("DOCKYARD_API_LOGGING") {
            self.api.logging = parse_flag("DOCKYARD_API_LOGGING", &v)?;
        }
        if let Some(v) = get("DOCKYARD_ENABLE_CORS") {
            self.api.enable_cors = parse_flag("DOCKYARD_ENABLE_CORS", &v)?;
        }
        if let Some(v) = get("DOCKYARD_SOCKET_GROUP") {
            self.api.socket_group = Some(v);
        }
        if let Some(v) = get("DOCKYARD_TLS") {
            self.api.tls = parse_flag("DOCKYARD_TLS", &v)?;
        }
        if let Some(v) = get("DOCKYARD_TLS_VERIFY") {
            self.api.tls_verify = parse_flag("DOCKYARD_TLS_VERIFY", &v)?;
        }
        if let Some(v) = get("DOCKYARD_TLS_CA") {
            self.api.tls_ca = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DOCKYARD_TLS_CERT") {
            self.api.tls_cert = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DOCKYARD_TLS_KEY") {
            self.api.tls_key = Some(PathBuf::from(v));
        }

        if let Some(v) = get("DOCKYARD_DISABLE_NETWORK") {
            self.network.disabled = parse_flag("DOCKYARD_DISABLE_NETWORK", &v)?;
        }
        if let Some(v) = get("DOCKYARD_BRIDGE") {
            self.network.bridge_iface = v;
        }
        if let Some(v) = get("DOCKYARD_BRIDGE_IP") {
            self.network.bridge_ip = Some(v);
        }
        if let Some(v) = get("DOCKYARD_IP") {
            self.network.default_binding_ip = v;
        }
        if let Some(v) = get("DOCKYARD_IPTABLES") {
            self.network.enable_iptables = parse_flag("DOCKYARD_IPTABLES", &v)?;
        }
        if let Some(v) = get("DOCKYARD_IP_FORWARD") {
            self.network.enable_ip_forward = parse_flag("DOCKYARD_IP_FORWARD", &v)?;
        }
        if let Some(v) = get("DOCKYARD_ICC") {
            self.network.inter_container_communication = parse_flag("DOCKYARD_ICC", &v)?;
        }
        if let Some(v) = get("DOCKYARD_MTU") {
            self.network.mtu = parse_number("DOCKYARD_MTU", &v)?;
        }

        if let Some(v) = get("DOCKYARD_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = get("DOCKYARD_JSON_LOGS") {
            self.log.json = parse_flag("DOCKYARD_JSON_LOGS", &v)?;
        }
        Ok(())
    }

    /// Reject settings the daemon cannot start with.
    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.hosts.is_empty() {
            return Err(DaemonError::Config("at least one listen host is required".into()));
        }
        if let Some(host) = self.hosts.iter().find(|h| !h.contains("://")) {
            return Err(DaemonError::Config(format!(
                "listen host {host:?} must have the form PROTO://ADDR"
            )));
        }
        if !self.root.is_absolute() {
            return Err(DaemonError::Config(format!(
                "root {:?} must be an absolute path",
                self.root
            )));
        }
        if let Some(name) = &self.graph_driver {
            GraphDriver::from_str(name)?;
        }
        if self.exec_driver.is_empty() {
            return Err(DaemonError::Config("exec_driver must not be empty".into()));
        }
        if self.api.tls_verify && self.api.tls_ca.is_none() {
            return Err(DaemonError::Config("tls_verify requires tls_ca".into()));
        }
        if !self.network.disabled
            && !self.network.enable_iptables
            && !self.network.inter_container_communication
        {
            return Err(DaemonError::Config(
                "inter-container communication relies on iptables; enable one of them".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, DaemonError> {
    parse_bool(raw).ok_or_else(|| DaemonError::Config(format!("{key}: {raw:?} is not a boolean")))
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, DaemonError> {
    raw.trim()
        .parse()
        .map_err(|_| DaemonError::Config(format!("{key}: {raw:?} is not a number")))
}
