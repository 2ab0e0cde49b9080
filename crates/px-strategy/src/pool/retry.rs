use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use px_common::PoolStats;

use super::{RejectReason, Rejected, Task, WorkerPool};
use crate::error::PoolError;
use crate::strategy_metrics;

/// Resubmits on a fixed interval while the wrapped pool reports `Busy`.
///
/// Once `max_attempts` submissions have been refused the task is dropped and
/// `PoolError::RetriesExhausted` is returned.
pub struct RetryPool {
    inner: Arc<dyn WorkerPool>,
    interval: Duration,
    max_attempts: u32,
}

impl RetryPool {
    pub fn new(inner: Arc<dyn WorkerPool>, interval: Duration, max_attempts: u32) -> Self {
        Self {
            inner,
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn inner(&self) -> &Arc<dyn WorkerPool> {
        &self.inner
    }
}

#[async_trait]
impl WorkerPool for RetryPool {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn is_inline(&self) -> bool {
        self.inner.is_inline()
    }

    fn try_submit(&self, task: Task) -> Result<(), Rejected> {
        self.inner.try_submit(task)
    }

    async fn submit(&self, task: Task) -> Result<(), PoolError> {
        let mut task = task;
        let mut attempts = 0;

        loop {
            match self.inner.try_submit(task) {
                Ok(()) => return Ok(()),
                Err(Rejected { task: returned, reason: RejectReason::Busy }) => {
                    attempts += 1;
                    if attempts >= self.max_attempts {
                        let pool = self.inner.name();
                        warn!(pool = %pool, attempts = attempts, "Pool still saturated, giving up on submission");
                        strategy_metrics::record_pool_retries_exhausted(&pool);
                        return Err(PoolError::RetriesExhausted { pool, attempts });
                    }
                    strategy_metrics::record_pool_retry(&self.inner.name());
                    task = returned;
                    tokio::time::sleep(self.interval).await;
                }
                Err(rejected) => return Err(rejected.into_error(&self.inner.name())),
            }
        }
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn stats(&self) -> Option<PoolStats> {
        self.inner.stats()
    }
}
