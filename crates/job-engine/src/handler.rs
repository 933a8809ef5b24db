//! Handler contract and the install convention.

use async_trait::async_trait;

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::job::Job;
use crate::status::Status;

/// A unit of behavior bound to a job name.
///
/// The engine awaits `handle` to completion before the invocation resolves.
/// Handlers that need long-running background work own that concurrency.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, job: &mut Job) -> Status;
}

/// Adapts a synchronous closure into a [`Handler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&mut Job) -> Status + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Job) -> Status + Send + Sync,
{
    async fn handle(&self, job: &mut Job) -> Status {
        (self.f)(job)
    }
}

/// Entry point through which a feature module registers its jobs.
///
/// Called exactly once per engine. A second call fails with
/// [`EngineError::DuplicateName`](crate::EngineError::DuplicateName).
pub trait Install {
    fn install(&self, engine: &Engine) -> EngineResult<()>;
}
