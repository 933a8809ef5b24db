//! # Job Engine
//!
//! In-process execution kernel that lets independently developed subsystems
//! register named units of work ("jobs") and lets callers invoke them by
//! name without knowing their implementations.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  install(&engine)   ┌──────────────────┐
//! │ Subsystem A │ ──────────────────▶ │                  │
//! └─────────────┘                     │      Engine      │
//! ┌─────────────┐  install(&engine)   │  name → Handler  │
//! │ Subsystem B │ ──────────────────▶ │                  │
//! └─────────────┘                     └────────┬─────────┘
//!                                              │ run("version", args, env)
//!                                              ▼
//!                                     ┌──────────────────┐
//!                                     │ Job → JobOutcome │
//!                                     │ stdout/stderr,   │
//!                                     │ env, Status      │
//!                                     └──────────────────┘
//! ```
//!
//! ## Error model
//!
//! - Registration conflicts are `Err(EngineError::DuplicateName)`.
//! - Unknown names and handler failures come back as data:
//!   [`Status::NotFound`] and [`Status::Error`] inside a [`JobOutcome`].

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod blackboard;
pub mod engine;
pub mod env;
pub mod error;
pub mod handler;
pub mod job;
pub mod output;
pub mod status;

pub use blackboard::Blackboard;
pub use engine::{Engine, EngineConfig, COMMANDS_JOB};
pub use env::{parse_bool, Env, EnvValue};
pub use error::{EngineError, EngineResult, EnvError};
pub use handler::{FnHandler, Handler, Install};
pub use job::{Job, JobOutcome};
pub use output::Output;
pub use status::Status;
