//! Graph driver selection.
//!
//! The daemon records which copy-on-write backend its image layers use. A
//! configured driver must be one we know; otherwise the first supported
//! driver in [`PRIORITY`] wins.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphDriver {
    Overlay,
    Aufs,
    Btrfs,
    Vfs,
}

pub const PRIORITY: [GraphDriver; 4] = [
    GraphDriver::Overlay,
    GraphDriver::Aufs,
    GraphDriver::Btrfs,
    GraphDriver::Vfs,
];

impl GraphDriver {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Overlay => "overlay",
            Self::Aufs => "aufs",
            Self::Btrfs => "btrfs",
            Self::Vfs => "vfs",
        }
    }

    /// Whether this driver can back `root` on a host with the given kernel
    /// filesystem list and mount table.
    #[must_use]
    pub fn supported(self, probe: &HostProbe, root: &Path) -> bool {
        match self {
            Self::Vfs => true,
            Self::Overlay => probe.has_filesystem("overlay"),
            Self::Aufs => probe.has_filesystem("aufs"),
            // btrfs subvolumes only work when the root itself lives on btrfs.
            Self::Btrfs => {
                probe.has_filesystem("btrfs") && probe.mount_type(root) == Some("btrfs")
            }
        }
    }
}

impl fmt::Display for GraphDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GraphDriver {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PRIORITY
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| DaemonError::Driver(format!("unknown graph driver {s:?}")))
    }
}

/// Snapshot of `/proc/filesystems` and `/proc/mounts`.
#[derive(Debug, Clone, Default)]
pub struct HostProbe {
    filesystems: String,
    mounts: String,
}

impl HostProbe {
    pub fn new(filesystems: impl Into<String>, mounts: impl Into<String>) -> Self {
        Self {
            filesystems: filesystems.into(),
            mounts: mounts.into(),
        }
    }

    /// Read the running kernel's tables. Unreadable tables count as empty.
    pub fn from_host() -> Self {
        let read = |path: &str| {
            std::fs::read_to_string(path).unwrap_or_else(|e| {
                debug!(path, error = %e, "Cannot read host table");
                String::new()
            })
        };
        Self::new(read("/proc/filesystems"), read("/proc/mounts"))
    }

    #[must_use]
    pub fn has_filesystem(&self, name: &str) -> bool {
        self.filesystems
            .lines()
            .filter_map(|line| line.split_whitespace().last())
            .any(|fs| fs == name)
    }

    /// Filesystem type of the longest mount point containing `path`.
    #[must_use]
    pub fn mount_type(&self, path: &Path) -> Option<&str> {
        self.mounts
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let _device = fields.next()?;
                let mount_point = fields.next()?;
                let fs_type = fields.next()?;
                Some((mount_point, fs_type))
            })
            .filter(|(mount_point, _)| path.starts_with(mount_point))
            .max_by_key(|(mount_point, _)| mount_point.len())
            .map(|(_, fs_type)| fs_type)
    }
}

/// Pick the driver for `root`.
pub fn select(
    configured: Option<&str>,
    probe: &HostProbe,
    root: &Path,
) -> Result<GraphDriver, DaemonError> {
    if let Some(name) = configured {
        let driver = GraphDriver::from_str(name)?;
        if !driver.supported(probe, root) {
            return Err(DaemonError::Driver(format!(
                "{driver} is not supported on this host"
            )));
        }
        info!(driver = %driver, "Using configured graph driver");
        return Ok(driver);
    }

    let driver = PRIORITY
        .into_iter()
        .find(|d| d.supported(probe, root))
        .unwrap_or(GraphDriver::Vfs);
    info!(driver = %driver, "Selected graph driver");
    Ok(driver)
}
