//! TaskPool - bounded queue feeding a semaphore-limited set of tokio tasks
//!
//! Lightweight pools run each task as a tokio task. Blocking and CPU-intensive
//! pools run each task on tokio's blocking thread pool so a task may park its
//! thread without stalling the async workers.

use std::cmp::max;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use px_common::{PoolKind, PoolSettings, PoolStats};

use super::{RejectReason, Rejected, Task, WorkerPool};
use crate::error::PoolError;
use crate::strategy_metrics;

const QUEUE_CAPACITY_MULTIPLIER: usize = 2;
const MIN_QUEUE_CAPACITY: usize = 50;

#[derive(Default)]
struct PoolCounters {
    queued: AtomicUsize,
    active: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
}

pub struct TaskPool {
    name: String,
    kind: PoolKind,
    concurrency: usize,
    queue_capacity: usize,
    /// `None` once stopped
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    counters: Arc<PoolCounters>,
}

impl TaskPool {
    /// Create the pool and spawn its dispatcher on the current runtime.
    pub fn new(
        name: impl Into<String>,
        kind: PoolKind,
        settings: &PoolSettings,
    ) -> Result<Self, PoolError> {
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        let name = name.into();
        let concurrency = settings.concurrency.max(1);
        let queue_capacity = settings
            .queue_capacity
            .unwrap_or_else(|| max(concurrency * QUEUE_CAPACITY_MULTIPLIER, MIN_QUEUE_CAPACITY))
            .max(1);

        let (tx, rx) = mpsc::channel(queue_capacity);
        let counters = Arc::new(PoolCounters::default());
        let semaphore = Arc::new(Semaphore::new(concurrency));

        runtime.spawn(dispatch_loop(
            name.clone(),
            kind,
            rx,
            semaphore,
            counters.clone(),
            runtime.clone(),
        ));

        info!(
            pool = %name,
            kind = %kind,
            concurrency = concurrency,
            queue_capacity = queue_capacity,
            "Started pool"
        );

        Ok(Self {
            name,
            kind,
            concurrency,
            queue_capacity,
            sender: Mutex::new(Some(tx)),
            counters,
        })
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.lock().is_none()
    }
}

async fn dispatch_loop(
    name: String,
    kind: PoolKind,
    mut rx: mpsc::Receiver<Task>,
    semaphore: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
    runtime: Handle,
) {
    // Take a permit before pulling from the queue so waiting work stays queued.
    while let Ok(permit) = semaphore.clone().acquire_owned().await {
        let Some(task) = rx.recv().await else {
            break;
        };

        counters.queued.fetch_sub(1, Ordering::SeqCst);
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        strategy_metrics::set_pool_active(&name, active);

        let running = RunningTask {
            pool: name.clone(),
            counters: counters.clone(),
            _permit: permit,
        };
        if kind.runs_on_dedicated_threads() {
            let handle = runtime.clone();
            runtime.spawn_blocking(move || {
                let _running = running;
                handle.block_on(task);
            });
        } else {
            runtime.spawn(async move {
                let _running = running;
                task.await;
            });
        }
    }

    debug!(pool = %name, "Pool dispatcher drained and stopped");
}

/// Bookkeeping for one started task, settled when the task ends or panics.
struct RunningTask {
    pool: String,
    counters: Arc<PoolCounters>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for RunningTask {
    fn drop(&mut self) {
        let active = self.counters.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
        strategy_metrics::set_pool_active(&self.pool, active);
    }
}

impl WorkerPool for TaskPool {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn try_submit(&self, task: Task) -> Result<(), Rejected> {
        let sender = match self.sender.lock().clone() {
            Some(sender) => sender,
            None => return Err(Rejected::new(task, RejectReason::Stopped)),
        };

        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(task) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::SeqCst);
                strategy_metrics::record_pool_task_submitted(&self.name);
                Ok(())
            }
            Err(err) => {
                self.counters.queued.fetch_sub(1, Ordering::SeqCst);
                let (task, reason) = match err {
                    TrySendError::Full(task) => (task, RejectReason::Busy),
                    TrySendError::Closed(task) => (task, RejectReason::Stopped),
                };
                strategy_metrics::record_pool_task_rejected(&self.name, reason);
                Err(Rejected::new(task, reason))
            }
        }
    }

    fn stop(&self) {
        if self.sender.lock().take().is_some() {
            info!(pool = %self.name, "Stopping pool; queued tasks will drain");
        }
    }

    fn stats(&self) -> Option<PoolStats> {
        Some(PoolStats {
            name: self.name.clone(),
            kind: self.kind,
            concurrency: self.concurrency,
            queue_capacity: self.queue_capacity,
            queued: self.counters.queued.load(Ordering::SeqCst),
            active: self.counters.active.load(Ordering::SeqCst),
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            stopped: self.is_stopped(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_queue_capacity_has_a_floor() {
        let pool = TaskPool::new("small", PoolKind::Light, &PoolSettings::new(2)).unwrap();
        assert_eq!(pool.stats().unwrap().queue_capacity, MIN_QUEUE_CAPACITY);

        let pool = TaskPool::new("large", PoolKind::Light, &PoolSettings::new(40)).unwrap();
        assert_eq!(pool.stats().unwrap().queue_capacity, 80);
    }

    #[tokio::test]
    async fn test_full_queue_returns_task_as_busy() {
        let settings = PoolSettings::new(1).with_queue_capacity(1);
        let pool = TaskPool::new("tiny", PoolKind::Light, &settings).unwrap();

        // Occupy the only permit, then fill the queue.
        let (release_tx, release_rx) = oneshot::channel::<()>();
        pool.try_submit(async move {
            let _ = release_rx.await;
        }
        .boxed())
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.try_submit(async {}.boxed()).unwrap();

        let rejected = pool.try_submit(async {}.boxed()).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::Busy);

        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn test_stop_drains_queued_work() {
        let pool = TaskPool::new("drain", PoolKind::Light, &PoolSettings::new(1)).unwrap();
        let (tx, rx) = oneshot::channel();
        pool.try_submit(async move {
            let _ = tx.send(7);
        }
        .boxed())
        .unwrap();
        pool.stop();

        assert_eq!(rx.await.unwrap(), 7);
        let rejected = pool.try_submit(async {}.boxed()).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::Stopped);
        assert!(pool.stats().unwrap().stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_task_still_settles_counters() {
        for kind in [PoolKind::Light, PoolKind::Blocking] {
            let pool = TaskPool::new("panicky", kind, &PoolSettings::new(1)).unwrap();
            pool.try_submit(async { panic!("task blew up"); }.boxed()).unwrap();

            let (tx, rx) = oneshot::channel();
            pool.try_submit(async move {
                let _ = tx.send(());
            }
            .boxed())
            .unwrap();
            tokio::time::timeout(Duration::from_secs(5), rx)
                .await
                .expect("permit of the panicked task was never returned")
                .unwrap();

            for _ in 0..100 {
                if pool.stats().unwrap().completed == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let stats = pool.stats().unwrap();
            assert_eq!(stats.completed, 2);
            assert_eq!(stats.active, 0);
        }
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = TaskPool::new("orphan", PoolKind::Light, &PoolSettings::new(1));
        assert!(matches!(result, Err(PoolError::NoRuntime)));
    }
}
