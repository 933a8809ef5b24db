//! # Job
//!
//! One invocation of a named handler: arguments, environment and two
//! output sinks. A `Job` belongs to exactly one invocation and is
//! consumed by [`Job::run`], which yields a [`JobOutcome`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::Engine;
use crate::env::Env;
use crate::error::{EngineError, EnvError};
use crate::output::{self, Output};
use crate::status::Status;

/// An invocation record.
pub struct Job {
    name: String,
    args: Vec<String>,
    env: Env,
    pub stdout: Output,
    pub stderr: Output,
    engine: Engine,
}

impl Job {
    pub(crate) fn new(engine: Engine, name: String) -> Self {
        Self {
            name,
            args: Vec::new(),
            env: Env::new(),
            stdout: Output::new(),
            stderr: Output::new(),
            engine,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: Env) -> Self {
        self.env.import(&env);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Env {
        &mut self.env
    }

    /// Engine that dispatched this job, for handlers that invoke other jobs.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn getenv(&self, key: &str) -> Option<String> {
        self.env.get(key)
    }

    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.set(key, value);
    }

    pub fn getenv_bool(&self, key: &str) -> Result<Option<bool>, EnvError> {
        self.env.get_bool(key)
    }

    pub fn setenv_bool(&mut self, key: impl Into<String>, value: bool) {
        self.env.set_bool(key, value);
    }

    pub fn getenv_int(&self, key: &str) -> Result<Option<i64>, EnvError> {
        self.env.get_int(key)
    }

    pub fn setenv_int(&mut self, key: impl Into<String>, value: i64) {
        self.env.set_int(key, value);
    }

    pub fn getenv_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, EnvError> {
        self.env.get_json(key)
    }

    pub fn setenv_json<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), EnvError> {
        self.env.set_json(key, value)
    }

    #[must_use]
    pub fn getenv_list(&self, key: &str) -> Option<Vec<String>> {
        self.env.get_list(key)
    }

    pub fn setenv_list<S: AsRef<str>>(&mut self, key: impl Into<String>, items: &[S]) {
        self.env.set_list(key, items);
    }

    #[must_use]
    pub fn env_exists(&self, key: &str) -> bool {
        self.env.exists(key)
    }

    pub fn import_env(&mut self, env: &Env) {
        self.env.import(env);
    }

    /// Record `err` on stderr and return [`Status::Error`].
    pub fn error(&self, err: impl fmt::Display) -> Status {
        self.stderr.write_line(&err.to_string());
        Status::Error
    }

    /// Record a usage message on stderr and return [`Status::Error`].
    pub fn usage(&self, synopsis: &str) -> Status {
        self.error(format!("usage: {} {}", self.name, synopsis))
    }

    /// `name(arg1, arg2)` form used in logs.
    #[must_use]
    pub fn call_string(&self) -> String {
        format!("{}({})", self.name, self.args.join(", "))
    }

    /// Dispatch this job through its engine and wait for the handler.
    pub async fn run(self) -> JobOutcome {
        let engine = self.engine.clone();
        engine.dispatch(self).await
    }

    pub(crate) fn into_outcome(self, status: Status) -> JobOutcome {
        JobOutcome {
            name: self.name,
            status,
            stdout: self.stdout.bytes(),
            stderr: self.stderr.bytes(),
            env: self.env,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

/// Result of a completed invocation.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub name: String,
    pub status: Status,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Environment as the handler left it.
    pub env: Env,
}

impl JobOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    #[must_use]
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Decode stdout as an encoded [`Env`].
    pub fn stdout_env(&self) -> Result<Env, EnvError> {
        Env::decode(self.stdout.as_slice())
    }

    /// Human-readable failure reason for a non-OK outcome.
    #[must_use]
    pub fn failure_message(&self) -> String {
        match self.status {
            Status::Ok => String::new(),
            Status::NotFound => "command not found".to_string(),
            Status::Error => output::last_line(&self.stderr)
                .unwrap_or_else(|| format!("exited with status {}", self.status.code())),
        }
    }

    /// Convert a non-OK outcome into [`EngineError::JobFailed`].
    pub fn into_result(self) -> Result<Self, EngineError> {
        if self.is_ok() {
            return Ok(self);
        }
        Err(EngineError::JobFailed {
            message: self.failure_message(),
            name: self.name,
            status: self.status,
        })
    }
}
