use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use px_common::PoolStats;

use super::{Rejected, Task, WorkerPool};
use crate::error::PoolError;

/// Stable reference to a replaceable pool.
///
/// Readers always observe either the previous or the new pool. Replacing the
/// pool neither drains nor stops the old one; work already handed to it runs
/// to completion there.
pub struct PoolHandle {
    current: RwLock<Arc<dyn WorkerPool>>,
    swaps: AtomicU64,
}

impl PoolHandle {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self {
            current: RwLock::new(pool),
            swaps: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Arc<dyn WorkerPool> {
        self.current.read().clone()
    }

    /// Install `pool` and return the one it replaced.
    pub fn replace(&self, pool: Arc<dyn WorkerPool>) -> Arc<dyn WorkerPool> {
        let previous = std::mem::replace(&mut *self.current.write(), pool);
        self.swaps.fetch_add(1, Ordering::SeqCst);
        previous
    }

    pub fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerPool for PoolHandle {
    fn name(&self) -> String {
        self.current().name()
    }

    fn is_inline(&self) -> bool {
        self.current().is_inline()
    }

    fn try_submit(&self, task: Task) -> Result<(), Rejected> {
        self.current().try_submit(task)
    }

    async fn submit(&self, task: Task) -> Result<(), PoolError> {
        let pool = self.current();
        pool.submit(task).await
    }

    fn stop(&self) {
        self.current().stop();
    }

    fn stats(&self) -> Option<PoolStats> {
        self.current().stats()
    }
}
