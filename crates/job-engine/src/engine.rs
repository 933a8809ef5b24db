//! # Engine
//!
//! The registry and dispatcher every subsystem installs its jobs into.
//!
//! ## How It Works
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! │                                                              │
//! │   register(name, handler)          run(name, args, env)      │
//! │          │                                 │                 │
//! │          ▼                                 ▼                 │
//! │   ┌──────────────┐   lookup      ┌──────────────────┐        │
//! │   │  handlers    │ ────────────▶ │ Job → handler    │        │
//! │   │  (RwLock)    │               │ → JobOutcome     │        │
//! │   └──────────────┘               └──────────────────┘        │
//! │                                                              │
//! │   blackboard (DashMap)     shutdown: flag → drain → hooks    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A name binds at most once; the first registration stays in effect.
//! - A handler is inserted fully built under the write lock, so lookups
//!   never observe a half-published entry.
//! - The lock is never held across a handler await; registration may run
//!   concurrently with dispatch.
//! - No per-name single-flight: concurrent runs of one name run concurrently.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use crate::blackboard::Blackboard;
use crate::env::Env;
use crate::error::{EngineError, EngineResult};
use crate::handler::{FnHandler, Handler};
use crate::job::{Job, JobOutcome};
use crate::status::Status;

/// Job the engine registers on construction; lists every registered name.
pub const COMMANDS_JOB: &str = "commands";

type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Engine timing configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long shutdown waits for in-flight jobs before running hooks.
    pub job_grace_period: Duration,
    /// Upper bound on the time all shutdown hooks may take together.
    pub hook_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            job_grace_period: Duration::from_secs(5),
            hook_timeout: Duration::from_secs(15),
        }
    }
}

struct EngineInner {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
    blackboard: Blackboard,
    hooks: Mutex<Vec<ShutdownHook>>,
    shutdown: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    stopped_tx: watch::Sender<bool>,
    in_flight: AtomicUsize,
    idle: Notify,
    config: EngineConfig,
}

/// Cloneable handle to the process engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (stopped_tx, _) = watch::channel(false);
        let mut handlers: HashMap<String, Arc<dyn Handler>> = HashMap::new();
        handlers.insert(
            COMMANDS_JOB.to_string(),
            Arc::new(FnHandler::new(list_commands)),
        );

        Self {
            inner: Arc::new(EngineInner {
                handlers: RwLock::new(handlers),
                blackboard: Blackboard::new(),
                hooks: Mutex::new(Vec::new()),
                shutdown: AtomicBool::new(false),
                shutdown_tx,
                stopped_tx,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                config,
            }),
        }
    }

    /// Bind `name` to `handler`.
    ///
    /// Fails with [`EngineError::DuplicateName`] when the name is taken.
    pub fn register<H>(&self, name: impl Into<String>, handler: H) -> EngineResult<()>
    where
        H: Handler + 'static,
    {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        let mut handlers = self.inner.handlers.write();

        match handlers.entry(name.into()) {
            Entry::Occupied(e) => {
                warn!(job = %e.key(), "Refusing to overwrite registered job");
                Err(EngineError::DuplicateName {
                    name: e.key().clone(),
                })
            }
            Entry::Vacant(v) => {
                debug!(job = %v.key(), "Registered job");
                v.insert(handler);
                Ok(())
            }
        }
    }

    /// Register a synchronous closure.
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F) -> EngineResult<()>
    where
        F: Fn(&mut Job) -> Status + Send + Sync + 'static,
    {
        self.register(name, FnHandler::new(f))
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.inner.handlers.read().get(name).cloned()
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.handlers.read().contains_key(name)
    }

    /// Registered job names, sorted.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Create a job. The name is resolved when the job runs.
    #[must_use]
    pub fn job(&self, name: impl Into<String>) -> Job {
        Job::new(self.clone(), name.into())
    }

    /// Create, run and await a job in one call.
    pub async fn run<I, S>(&self, name: impl Into<String>, args: I, env: Env) -> JobOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.job(name).with_args(args).with_env(env).run().await
    }

    pub(crate) async fn dispatch(&self, mut job: Job) -> JobOutcome {
        let _guard = InFlight::enter(&self.inner);
        let call = job.call_string();

        if self.is_shutdown() {
            debug!(job = %call, "Rejected job after shutdown");
            job.stderr.write_line(&EngineError::Shutdown.to_string());
            return job.into_outcome(Status::Error);
        }

        let Some(handler) = self.lookup(job.name()) else {
            debug!(job = %call, "No handler registered");
            return job.into_outcome(Status::NotFound);
        };

        debug!("+job {}", call);
        let status = handler.handle(&mut job).await;
        debug!("-job {} = {}", call, status);

        job.into_outcome(status)
    }

    /// Shared state subsystems publish ambient values into.
    #[must_use]
    pub fn blackboard(&self) -> &Blackboard {
        &self.inner.blackboard
    }

    /// Number of jobs currently being dispatched.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Register a hook run once during shutdown.
    ///
    /// Returns `false`, dropping the hook unrun, when shutdown has already
    /// begun. A hook that was accepted is guaranteed a turn.
    pub fn on_shutdown<F, Fut>(&self, hook: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut hooks = self.inner.hooks.lock();
        if self.is_shutdown() {
            warn!("Shutdown hook registered after shutdown; it will not run");
            return false;
        }
        hooks.push(Box::new(move || Box::pin(hook())));
        true
    }

    /// Resolves once shutdown has begun.
    pub fn shutdown_requested(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.shutdown_tx.subscribe();
        async move {
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }

    /// Wind the engine down.
    ///
    /// Only the first call starts anything: it stops new jobs and spawns a
    /// task that waits up to the grace period for in-flight jobs, then runs
    /// every shutdown hook concurrently under the hook timeout. Every call
    /// waits for that task, and dropping a caller does not cancel it. A hook
    /// must not await `shutdown` itself.
    pub async fn shutdown(&self) {
        let mut stopped = self.inner.stopped_tx.subscribe();

        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already in progress");
        } else {
            info!(in_flight = self.in_flight(), "Engine shutting down");
            self.inner.shutdown_tx.send_replace(true);
            tokio::spawn(self.clone().wind_down());
        }

        let _ = stopped.wait_for(|done| *done).await;
    }

    async fn wind_down(self) {
        let _stopped = Stopped(Arc::clone(&self.inner));

        let grace = self.inner.config.job_grace_period;
        if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
            warn!(
                in_flight = self.in_flight(),
                grace_secs = grace.as_secs_f64(),
                "Jobs still running after grace period"
            );
        }

        let hooks: Vec<ShutdownHook> = std::mem::take(&mut *self.inner.hooks.lock());
        let count = hooks.len();
        let pending = join_all(hooks.into_iter().map(|hook| hook()));
        if tokio::time::timeout(self.inner.config.hook_timeout, pending)
            .await
            .is_err()
        {
            error!(hooks = count, "Shutdown hooks timed out");
        }

        info!("Engine shutdown complete");
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("jobs", &self.inner.handlers.read().len())
            .field("in_flight", &self.in_flight())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Marks shutdown complete when the wind-down task ends, even by panic.
struct Stopped(Arc<EngineInner>);

impl Drop for Stopped {
    fn drop(&mut self) {
        self.0.stopped_tx.send_replace(true);
    }
}

/// Counts a dispatch for the shutdown drain.
struct InFlight<'a> {
    inner: &'a EngineInner,
}

impl<'a> InFlight<'a> {
    fn enter(inner: &'a EngineInner) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

fn list_commands(job: &mut Job) -> Status {
    for name in job.engine().commands() {
        job.stdout.write_line(&name);
    }
    Status::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast_engine() -> Engine {
        Engine::with_config(EngineConfig {
            job_grace_period: Duration::from_millis(200),
            hook_timeout: Duration::from_millis(200),
        })
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let engine = Engine::new();
        engine.register_fn("ping", |_| Status::Ok).unwrap();

        let err = engine.register_fn("ping", |_| Status::Error).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateName { ref name } if name == "ping"));
    }

    #[tokio::test]
    async fn test_first_handler_stays_in_effect() {
        let engine = Engine::new();
        engine
            .register_fn("ping", |job| {
                job.stdout.write_line("first");
                Status::Ok
            })
            .unwrap();
        let _ = engine.register_fn("ping", |job| {
            job.stdout.write_line("second");
            Status::Ok
        });

        let outcome = engine.run("ping", Vec::<String>::new(), Env::new()).await;
        assert_eq!(outcome.stdout_str(), "first\n");
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found_without_output() {
        let engine = Engine::new();
        let outcome = engine.run("bogus", Vec::<String>::new(), Env::new()).await;

        assert_eq!(outcome.status, Status::NotFound);
        assert!(outcome.stdout.is_empty());
        assert!(outcome.stderr.is_empty());

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.to_string(), "bogus: command not found");
    }

    #[tokio::test]
    async fn test_handler_sees_args_and_env() {
        let engine = Engine::new();
        engine
            .register_fn("echo", |job| {
                let greeting = job.getenv("Greeting").unwrap_or_default();
                let line = format!("{} {}", greeting, job.args().join(" "));
                job.stdout.write_line(&line);
                job.setenv("Echoed", "1");
                Status::Ok
            })
            .unwrap();

        let env: Env = [("Greeting", "hello")].into_iter().collect();
        let outcome = engine.run("echo", ["a", "b"], env).await;

        assert!(outcome.is_ok());
        assert_eq!(outcome.stdout_str(), "hello a b\n");
        assert_eq!(outcome.env.get_bool("Echoed").unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_handler_failure_carries_cause() {
        let engine = Engine::new();
        engine
            .register_fn("fail", |job| job.error("disk on fire"))
            .unwrap();

        let outcome = engine.job("fail").run().await;
        assert_eq!(outcome.status, Status::Error);

        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, EngineError::JobFailed { status: Status::Error, .. }));
        assert_eq!(err.to_string(), "fail: disk on fire");
    }

    #[tokio::test]
    async fn test_commands_job_lists_names() {
        let engine = Engine::new();
        engine.register_fn("version", |_| Status::Ok).unwrap();
        engine.register_fn("info", |_| Status::Ok).unwrap();

        let outcome = engine.job(COMMANDS_JOB).run().await;
        assert_eq!(outcome.stdout_str(), "commands\ninfo\nversion\n");
    }

    #[tokio::test]
    async fn test_jobs_rejected_after_shutdown() {
        let engine = fast_engine();
        engine.register_fn("ping", |_| Status::Ok).unwrap();
        engine.shutdown().await;

        let outcome = engine.job("ping").run().await;
        assert_eq!(outcome.status, Status::Error);
        assert_eq!(outcome.stderr_str(), "engine is shutdown\n");
    }

    #[tokio::test]
    async fn test_shutdown_runs_hooks_once() {
        let engine = fast_engine();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        engine.on_shutdown(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::join!(engine.shutdown(), engine.shutdown());
        engine.shutdown().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(engine.is_shutdown());
    }

    #[tokio::test]
    async fn test_second_shutdown_waits_for_hooks() {
        let engine = fast_engine();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        engine.on_shutdown(move || async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.shutdown().await }
        });
        while !engine.is_shutdown() {
            tokio::task::yield_now().await;
        }
        engine.shutdown().await;
        assert!(done.load(Ordering::SeqCst));
        first.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_shutdown_still_runs_hooks() {
        let engine = fast_engine();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        engine.on_shutdown(move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let cancelled = tokio::time::timeout(Duration::from_millis(5), engine.shutdown()).await;
        assert!(cancelled.is_err());

        tokio::time::timeout(Duration::from_secs(2), engine.shutdown())
            .await
            .expect("second shutdown should complete");
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_hook_does_not_wedge_shutdown() {
        let engine = fast_engine();
        engine.on_shutdown(|| async { panic!("hook failed") });

        tokio::time::timeout(Duration::from_secs(2), engine.shutdown())
            .await
            .expect("shutdown should complete");
        tokio::time::timeout(Duration::from_secs(2), engine.shutdown())
            .await
            .expect("repeat shutdown should complete");
    }

    #[tokio::test]
    async fn test_hook_refused_after_shutdown() {
        let engine = fast_engine();
        assert!(engine.on_shutdown(|| async {}));
        engine.shutdown().await;

        assert!(!engine.on_shutdown(|| async {}));
    }

    #[tokio::test]
    async fn test_shutdown_requested_resolves() {
        let engine = fast_engine();
        let waiter = tokio::spawn(engine.shutdown_requested());
        engine.shutdown().await;

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_job() {
        let engine = fast_engine();
        let finished = Arc::new(AtomicBool::new(false));

        struct Slow(Arc<AtomicBool>);

        #[async_trait::async_trait]
        impl Handler for Slow {
            async fn handle(&self, _job: &mut Job) -> Status {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.0.store(true, Ordering::SeqCst);
                Status::Ok
            }
        }

        engine.register("slow", Slow(Arc::clone(&finished))).unwrap();
        let running = tokio::spawn({
            let engine = engine.clone();
            async move { engine.job("slow").run().await }
        });
        while engine.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        engine.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(running.await.unwrap().is_ok());
    }
}
