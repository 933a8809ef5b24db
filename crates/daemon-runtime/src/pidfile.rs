//! Pid file guarding against two daemons sharing one root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::DaemonError;

#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write our pid to `path`, refusing if it names a live process.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let path = path.into();
        if let Some(pid) = read_pid(&path) {
            if process_alive(pid) {
                return Err(DaemonError::PidFile { path, pid });
            }
            debug!(pid, path = %path.display(), "Replacing stale pid file");
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(DaemonError::io(parent))?;
        }
        fs::write(&path, format!("{}\n", std::process::id())).map_err(DaemonError::io(&path))?;
        info!(path = %path.display(), "Pid file written");
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/dockyard.pid");

        let pidfile = PidFile::create(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id()));

        pidfile.remove().unwrap();
        assert!(!path.exists());
        pidfile.remove().unwrap();
    }

    #[test]
    fn test_live_pid_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockyard.pid");
        fs::write(&path, format!("{}\n", std::process::id())).unwrap();

        assert!(matches!(
            PidFile::create(&path),
            Err(DaemonError::PidFile { pid, .. }) if pid == std::process::id()
        ));
    }

    #[test]
    fn test_garbage_pid_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockyard.pid");
        fs::write(&path, "not-a-pid").unwrap();

        PidFile::create(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id()));
    }
}
