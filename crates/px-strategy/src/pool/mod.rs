//! Worker pools and the handles that let a running pipeline swap them
//!
//! - `TaskPool`: tokio-backed pool with a bounded queue and a semaphore limit
//! - `InlinePool`: runs work on the submitting task
//! - `RetryPool`: resubmits while the wrapped pool is saturated
//! - `InstrumentedPool`: carries the submitter's tracing span into the task
//! - `PoolHandle`: stable reference whose backing pool can be replaced

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::warn;

use px_common::PoolStats;

use crate::error::PoolError;

mod factory;
mod handle;
mod inline;
mod instrumented;
mod retry;
mod task_pool;

pub use factory::{PoolFactory, TokioPoolFactory};
pub use handle::PoolHandle;
pub use inline::InlinePool;
pub use instrumented::InstrumentedPool;
pub use retry::RetryPool;
pub use task_pool::TaskPool;

/// Unit of work accepted by a pool
pub type Task = BoxFuture<'static, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Submission queue is full; a later attempt may succeed
    Busy,
    /// Pool no longer accepts work
    Stopped,
}

/// A refused submission. The task is handed back so the caller can retry it.
pub struct Rejected {
    pub task: Task,
    pub reason: RejectReason,
}

impl Rejected {
    pub fn new(task: Task, reason: RejectReason) -> Self {
        Self { task, reason }
    }

    pub fn into_error(self, pool: &str) -> PoolError {
        match self.reason {
            RejectReason::Busy => PoolError::Busy { pool: pool.to_string() },
            RejectReason::Stopped => PoolError::Stopped { pool: pool.to_string() },
        }
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").field("reason", &self.reason).finish_non_exhaustive()
    }
}

/// An executor tasks can be handed to.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    fn name(&self) -> String;

    /// True when submitted work runs on the submitting task itself.
    fn is_inline(&self) -> bool {
        false
    }

    /// Submit without waiting. A full queue returns the task with `RejectReason::Busy`.
    fn try_submit(&self, task: Task) -> Result<(), Rejected>;

    /// Submit, waiting as long as this pool's policy allows.
    async fn submit(&self, task: Task) -> Result<(), PoolError> {
        self.try_submit(task)
            .map_err(|rejected| rejected.into_error(&self.name()))
    }

    /// Stop accepting work. Already queued work still runs.
    fn stop(&self);

    fn stats(&self) -> Option<PoolStats> {
        None
    }
}

/// Hand `work` to `pool` and wait for its output without blocking the caller.
///
/// Inline pools run the work directly on the calling task. A panic there is
/// contained and reported as `PoolError::Abandoned`, the same as a task that
/// panicked on a pooled worker.
pub async fn run_on<F, T>(pool: &dyn WorkerPool, work: F) -> Result<T, PoolError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    if pool.is_inline() {
        return AssertUnwindSafe(work).catch_unwind().await.map_err(|_| {
            warn!(pool = %pool.name(), "Inline work panicked");
            PoolError::Abandoned { pool: pool.name() }
        });
    }

    let (tx, rx) = oneshot::channel();
    pool.submit(Box::pin(async move {
        let _ = tx.send(work.await);
    }))
    .await?;

    rx.await.map_err(|_| PoolError::Abandoned { pool: pool.name() })
}
