use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::Instrument;

use px_common::PoolStats;

use super::{Rejected, Task, WorkerPool};
use crate::error::PoolError;

/// Runs each task inside the tracing span that was current at submission.
pub struct InstrumentedPool {
    inner: Arc<dyn WorkerPool>,
}

impl InstrumentedPool {
    pub fn new(inner: Arc<dyn WorkerPool>) -> Self {
        Self { inner }
    }

    fn instrument(task: Task) -> Task {
        task.in_current_span().boxed()
    }
}

#[async_trait]
impl WorkerPool for InstrumentedPool {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn is_inline(&self) -> bool {
        self.inner.is_inline()
    }

    fn try_submit(&self, task: Task) -> Result<(), Rejected> {
        self.inner.try_submit(Self::instrument(task))
    }

    async fn submit(&self, task: Task) -> Result<(), PoolError> {
        self.inner.submit(Self::instrument(task)).await
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn stats(&self) -> Option<PoolStats> {
        self.inner.stats()
    }
}
