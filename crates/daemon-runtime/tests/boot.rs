//! Boot-time install ordering.

use daemon_runtime::{builtins, Builtins, DaemonConfig, DaemonError, Lifecycle, LifecycleState};
use job_engine::{EngineError, Env, Status};

const EXPECTED_JOBS: &[&str] = &[
    "acceptconnections",
    "auth",
    "commands",
    "events",
    "init_networkdriver",
    "log",
    "search",
    "serveapi",
    "subscribers_count",
    "version",
];

#[test]
fn test_boot_installs_same_jobs_every_time() {
    let first = Lifecycle::boot(DaemonConfig::default()).unwrap();
    let second = Lifecycle::boot(DaemonConfig::default()).unwrap();

    assert_eq!(first.engine().commands(), EXPECTED_JOBS);
    assert_eq!(first.engine().commands(), second.engine().commands());
    assert_eq!(first.state(), LifecycleState::Booting);
}

#[test]
fn test_second_install_is_duplicate_name() {
    let config = DaemonConfig::default();
    let builtins = Builtins::from_config(&config).unwrap();
    let lifecycle = Lifecycle::boot_with(config, &builtins).unwrap();

    let err = builtins::register(lifecycle.engine(), &builtins).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateName { ref name } if name == "init_networkdriver"));
}

#[test]
fn test_bad_index_server_fails_boot() {
    let config = DaemonConfig {
        index_server: "index.example.com".into(),
        ..DaemonConfig::default()
    };
    assert!(matches!(
        Lifecycle::boot(config),
        Err(DaemonError::Config(_))
    ));
}

#[tokio::test]
async fn test_version_needs_no_daemon_state() {
    let lifecycle = Lifecycle::boot(DaemonConfig::default()).unwrap();

    let outcome = lifecycle
        .engine()
        .run("version", Vec::<String>::new(), Env::new())
        .await;
    assert_eq!(outcome.status, Status::Ok);
    let report = outcome.stdout_env().unwrap();
    assert_eq!(report.get("Version").as_deref(), Some(env!("CARGO_PKG_VERSION")));
    assert!(report.exists("Os"));

    // State-dependent jobs arrive with core initialization.
    let info = lifecycle
        .engine()
        .run("info", Vec::<String>::new(), Env::new())
        .await;
    assert_eq!(info.status, Status::NotFound);
}
