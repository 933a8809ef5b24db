//! # Dockyard Daemon Runtime
//!
//! Composes the feature crates into one daemon process.
//!
//! ## Modular Structure
//!
//! - `builtins` - fixed install order of every feature module
//! - `lifecycle` - boot, the core-init fork, readiness, shutdown
//! - `daemon` - core daemon state and the `info`/`containers` jobs
//! - `signal` - SIGINT/SIGTERM/SIGQUIT trap with collapsed shutdown
//! - `network`, `version` - static jobs
//! - `config`, `telemetry` - ambient configuration and logging
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then `DOCKYARD_*` environment)
//! 2. Initialize logging
//! 3. Boot: build the engine, install builtins
//! 4. Trap signals
//! 5. Run: core init in the background, `serveapi` in the foreground
//! 6. Core init opens the readiness gate via `acceptconnections`

pub mod builtins;
pub mod config;
pub mod daemon;
pub mod error;
pub mod graphdriver;
pub mod lifecycle;
pub mod network;
pub mod pidfile;
pub mod signal;
pub mod telemetry;
pub mod version;

pub use builtins::Builtins;
pub use config::DaemonConfig;
pub use daemon::{ContainerRecord, ContainerState, CoreDaemon};
pub use error::DaemonError;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use signal::{
    trapped_signals, ShutdownTrigger, SignalTrap, TrapAction, TrapSignal, TrapState,
};
pub use version::VersionInfo;
