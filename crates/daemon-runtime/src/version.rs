//! The `version` job.

use std::path::PathBuf;

use async_trait::async_trait;
use job_engine::{Env, EnvError, Handler, Job, Status};

/// Remote API version this daemon speaks.
pub const API_VERSION: &str = "1.15";

const KERNEL_RELEASE: &str = "/proc/sys/kernel/osrelease";

/// Build metadata reported by `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    pub api_version: String,
    pub git_commit: String,
    pub rust_version: String,
    pub os: String,
    pub arch: String,
}

impl VersionInfo {
    /// Metadata of the running binary. `DOCKYARD_GITCOMMIT` at build time
    /// fills in the commit.
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: API_VERSION.to_string(),
            git_commit: option_env!("DOCKYARD_GITCOMMIT")
                .unwrap_or("unknown")
                .to_string(),
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self::current()
    }
}

pub struct VersionJob {
    info: VersionInfo,
    kernel_release: PathBuf,
}

impl VersionJob {
    #[must_use]
    pub fn new(info: VersionInfo) -> Self {
        Self {
            info,
            kernel_release: PathBuf::from(KERNEL_RELEASE),
        }
    }

    /// Read the kernel release from `path` instead of procfs.
    #[must_use]
    pub fn with_kernel_release(mut self, path: impl Into<PathBuf>) -> Self {
        self.kernel_release = path.into();
        self
    }

    fn report(&self) -> Result<Env, EnvError> {
        let mut v = Env::new();
        v.set_json("Version", &self.info.version)?;
        v.set_json("ApiVersion", &self.info.api_version)?;
        v.set("GitCommit", self.info.git_commit.as_str());
        v.set("RustVersion", self.info.rust_version.as_str());
        v.set("Os", self.info.os.as_str());
        v.set("Arch", self.info.arch.as_str());
        if let Some(kernel) = kernel_version(&self.kernel_release) {
            v.set("KernelVersion", kernel);
        }
        Ok(v)
    }
}

#[async_trait]
impl Handler for VersionJob {
    async fn handle(&self, job: &mut Job) -> Status {
        let report = match self.report() {
            Ok(report) => report,
            Err(e) => return job.error(e),
        };
        if let Err(e) = report.encode(job.stdout.clone()) {
            return job.error(e);
        }
        job.import_env(&report);
        Status::Ok
    }
}

pub(crate) fn kernel_version(path: &std::path::Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_engine::Engine;

    fn fixed() -> VersionInfo {
        VersionInfo {
            version: "1.2.3".into(),
            api_version: API_VERSION.into(),
            git_commit: "abc123".into(),
            rust_version: "1.82.0".into(),
            os: "linux".into(),
            arch: "x86_64".into(),
        }
    }

    #[tokio::test]
    async fn test_version_reports_json_and_plain_fields() {
        let dir = tempfile::tempdir().unwrap();
        let release = dir.path().join("osrelease");
        std::fs::write(&release, "6.1.0-test\n").unwrap();

        let engine = Engine::new();
        engine
            .register("version", VersionJob::new(fixed()).with_kernel_release(&release))
            .unwrap();

        let outcome = engine.run("version", Vec::<String>::new(), Env::new()).await;
        assert!(outcome.is_ok());

        let body: serde_json::Value = serde_json::from_slice(&outcome.stdout).unwrap();
        assert_eq!(body["Version"], "1.2.3");
        assert_eq!(body["ApiVersion"], API_VERSION);
        assert_eq!(body["GitCommit"], "abc123");
        assert_eq!(body["Os"], "linux");
        assert_eq!(body["KernelVersion"], "6.1.0-test");

        let version: Option<String> = outcome.env.get_json("Version").unwrap();
        assert_eq!(version.as_deref(), Some("1.2.3"));
    }

    #[tokio::test]
    async fn test_missing_kernel_release_is_omitted() {
        let engine = Engine::new();
        engine
            .register(
                "version",
                VersionJob::new(fixed()).with_kernel_release("/nonexistent/osrelease"),
            )
            .unwrap();

        let outcome = engine.run("version", Vec::<String>::new(), Env::new()).await;
        assert!(outcome.is_ok());
        let env = outcome.stdout_env().unwrap();
        assert!(!env.exists("KernelVersion"));
        assert_eq!(env.get("Arch").as_deref(), Some("x86_64"));
    }
}
