//! Job scheduler contract consumed by the dispatch core.
//!
//! The application only starts the scheduler on `start()`, stops it on `stop()` and
//! exposes it through [`Context::job_queue`](crate::Context::job_queue); scheduling
//! semantics belong to the implementation.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A scheduled callback.
pub type JobFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Handle to a scheduled job.
pub trait JobHandle: Send + Sync {
    /// Unschedules the job. Removing an already-removed job is a no-op.
    fn remove(&self);
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    fn running(&self) -> bool;

    fn run_once(&self, delay: Duration, job: JobFn) -> Arc<dyn JobHandle>;
    fn run_repeating(&self, interval: Duration, job: JobFn) -> Arc<dyn JobHandle>;
}
