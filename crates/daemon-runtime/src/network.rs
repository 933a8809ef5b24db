//! `init_networkdriver`: resolve and publish bridge settings.
//!
//! The job validates what it is given and publishes the result on the
//! engine blackboard under [`BRIDGE_KEY`] for later jobs to read. It does
//! not touch host interfaces.

use std::net::IpAddr;

use job_engine::{Env, EnvError, Job, Status};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::NetworkConfig;

pub const BRIDGE_KEY: &str = "network.bridge";

pub const BRIDGE_IFACE: &str = "BridgeIface";
pub const BRIDGE_IP: &str = "BridgeIP";
pub const DEFAULT_BINDING_IP: &str = "DefaultBindingIP";
pub const ENABLE_IPTABLES: &str = "EnableIptables";
pub const ENABLE_IP_FORWARD: &str = "EnableIpForward";
pub const INTER_CONTAINER_COMMUNICATION: &str = "InterContainerCommunication";
pub const MTU: &str = "Mtu";

/// Linux caps interface names at 15 bytes.
const MAX_IFACE_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub iface: String,
    pub address: Option<IpAddr>,
    pub prefix_len: Option<u8>,
    pub default_binding_ip: IpAddr,
    pub enable_iptables: bool,
    pub enable_ip_forward: bool,
    pub inter_container_communication: bool,
    pub mtu: u32,
}

impl BridgeSettings {
    fn from_job(job: &Job) -> Result<Self, String> {
        let flag = |key: &str, default: bool| -> Result<bool, String> {
            Ok(job.getenv_bool(key).map_err(display)?.unwrap_or(default))
        };

        let iface = job
            .getenv(BRIDGE_IFACE)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "docker0".to_string());
        if iface.len() > MAX_IFACE_LEN
            || iface.contains(|c: char| c == '/' || c.is_whitespace())
        {
            return Err(format!("invalid bridge interface name {iface:?}"));
        }

        let (address, prefix_len) = match job.getenv(BRIDGE_IP).filter(|v| !v.is_empty()) {
            Some(cidr) => {
                let (addr, prefix) = parse_cidr(&cidr)?;
                (Some(addr), Some(prefix))
            }
            None => (None, None),
        };

        let default_binding_ip = match job.getenv(DEFAULT_BINDING_IP).filter(|v| !v.is_empty()) {
            Some(ip) => ip
                .parse()
                .map_err(|_| format!("invalid default binding IP {ip:?}"))?,
            None => IpAddr::from([0, 0, 0, 0]),
        };

        let enable_iptables = flag(ENABLE_IPTABLES, true)?;
        let inter_container_communication = flag(INTER_CONTAINER_COMMUNICATION, true)?;
        if !enable_iptables && !inter_container_communication {
            return Err(
                "disabling inter-container communication requires iptables to be enabled".into(),
            );
        }

        let mtu = job.getenv_int(MTU).map_err(display)?.unwrap_or(1500);
        if !(68..=65535).contains(&mtu) {
            return Err(format!("MTU {mtu} is out of range"));
        }

        Ok(Self {
            iface,
            address,
            prefix_len,
            default_binding_ip,
            enable_iptables,
            enable_ip_forward: flag(ENABLE_IP_FORWARD, true)?,
            inter_container_communication,
            mtu: mtu as u32,
        })
    }

    fn to_env(&self) -> Env {
        let mut env = Env::new();
        env.set(BRIDGE_IFACE, self.iface.as_str());
        if let (Some(addr), Some(prefix)) = (self.address, self.prefix_len) {
            env.set(BRIDGE_IP, format!("{addr}/{prefix}"));
        }
        env.set(DEFAULT_BINDING_IP, self.default_binding_ip.to_string());
        env.set_bool(ENABLE_IPTABLES, self.enable_iptables);
        env.set_bool(ENABLE_IP_FORWARD, self.enable_ip_forward);
        env.set_bool(INTER_CONTAINER_COMMUNICATION, self.inter_container_communication);
        env.set_int(MTU, i64::from(self.mtu));
        env
    }
}

fn display(e: EnvError) -> String {
    e.to_string()
}

fn parse_cidr(raw: &str) -> Result<(IpAddr, u8), String> {
    let invalid = || format!("invalid bridge CIDR {raw:?}");
    let (addr, prefix) = raw.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid());
    }
    Ok((addr, prefix))
}

/// Job env carrying the settings from [`NetworkConfig`].
#[must_use]
pub fn job_env(config: &NetworkConfig) -> Env {
    let mut env = Env::new();
    env.set(BRIDGE_IFACE, config.bridge_iface.as_str());
    if let Some(ip) = &config.bridge_ip {
        env.set(BRIDGE_IP, ip.as_str());
    }
    env.set(DEFAULT_BINDING_IP, config.default_binding_ip.as_str());
    env.set_bool(ENABLE_IPTABLES, config.enable_iptables);
    env.set_bool(ENABLE_IP_FORWARD, config.enable_ip_forward);
    env.set_bool(INTER_CONTAINER_COMMUNICATION, config.inter_container_communication);
    env.set_int(MTU, i64::from(config.mtu));
    env
}

pub fn init_networkdriver(job: &mut Job) -> Status {
    let settings = match BridgeSettings::from_job(job) {
        Ok(settings) => settings,
        Err(e) => return job.error(e),
    };

    if let Err(e) = job.engine().blackboard().set_as(BRIDGE_KEY, &settings) {
        warn!(error = %e, "Failed to publish bridge settings");
        return job.error(e);
    }
    if let Err(e) = settings.to_env().encode(job.stdout.clone()) {
        return job.error(e);
    }

    info!(
        bridge = %settings.iface,
        mtu = settings.mtu,
        iptables = settings.enable_iptables,
        "Network driver initialized"
    );
    Status::Ok
}
