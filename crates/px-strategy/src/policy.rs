//! Pool selection per processing type
//!
//! | Processing type        | Dispatch                   | Callback              | Context       |
//! |------------------------|----------------------------|-----------------------|---------------|
//! | `LIGHT`                | inline                     | inline                | lightweight   |
//! | `LIGHT_ASYNC`          | inline                     | instrumented light    | lightweight   |
//! | `BLOCKING` / `IO`      | retrying context pool      | inline                | blocking      |
//! | `CPU_INTENSIVE`        | retrying context pool      | inline                | CPU-intensive |

use std::sync::Arc;
use std::time::Duration;

use px_common::{PoolKind, ProcessingType};

use crate::pool::{InlinePool, InstrumentedPool, RetryPool, WorkerPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTarget {
    Inline,
    /// The context pool behind a retry wrapper, instrumented
    RetryingContextPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackTarget {
    Inline,
    /// The lightweight pool, instrumented
    InstrumentedLight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextTarget {
    Light,
    Blocking,
    CpuIntensive,
}

impl ContextTarget {
    pub fn pool_kind(&self) -> PoolKind {
        match self {
            ContextTarget::Light => PoolKind::Light,
            ContextTarget::Blocking => PoolKind::Blocking,
            ContextTarget::CpuIntensive => PoolKind::CpuIntensive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAssignment {
    pub dispatch: DispatchTarget,
    pub callback: CallbackTarget,
    pub context: ContextTarget,
}

impl PoolAssignment {
    pub const fn for_type(processing_type: ProcessingType) -> Self {
        match processing_type {
            ProcessingType::Light => Self {
                dispatch: DispatchTarget::Inline,
                callback: CallbackTarget::Inline,
                context: ContextTarget::Light,
            },
            ProcessingType::LightAsync => Self {
                dispatch: DispatchTarget::Inline,
                callback: CallbackTarget::InstrumentedLight,
                context: ContextTarget::Light,
            },
            ProcessingType::Blocking | ProcessingType::Io => Self {
                dispatch: DispatchTarget::RetryingContextPool,
                callback: CallbackTarget::Inline,
                context: ContextTarget::Blocking,
            },
            ProcessingType::CpuIntensive => Self {
                dispatch: DispatchTarget::RetryingContextPool,
                callback: CallbackTarget::Inline,
                context: ContextTarget::CpuIntensive,
            },
        }
    }
}

/// Concrete pools chosen for one component
#[derive(Clone)]
pub struct ResolvedPools {
    pub dispatch: Arc<dyn WorkerPool>,
    pub callback: Arc<dyn WorkerPool>,
    pub context: Arc<dyn WorkerPool>,
}

/// The pools a started strategy owns.
#[derive(Clone)]
pub struct StrategyPools {
    pub inline: Arc<dyn WorkerPool>,
    /// Already retry-wrapped
    pub light: Arc<dyn WorkerPool>,
    pub blocking: Arc<dyn WorkerPool>,
    pub cpu_intensive: Arc<dyn WorkerPool>,
    pub retry_interval: Duration,
    pub retry_max_attempts: u32,
}

impl StrategyPools {
    pub fn new(
        light: Arc<dyn WorkerPool>,
        blocking: Arc<dyn WorkerPool>,
        cpu_intensive: Arc<dyn WorkerPool>,
        retry_interval: Duration,
        retry_max_attempts: u32,
    ) -> Self {
        Self {
            inline: Arc::new(InlinePool::default()),
            light,
            blocking,
            cpu_intensive,
            retry_interval,
            retry_max_attempts,
        }
    }

    pub fn context_pool(&self, target: ContextTarget) -> Arc<dyn WorkerPool> {
        match target {
            ContextTarget::Light => self.light.clone(),
            ContextTarget::Blocking => self.blocking.clone(),
            ContextTarget::CpuIntensive => self.cpu_intensive.clone(),
        }
    }

    pub fn resolve(&self, assignment: PoolAssignment) -> ResolvedPools {
        let context = self.context_pool(assignment.context);

        let dispatch: Arc<dyn WorkerPool> = match assignment.dispatch {
            DispatchTarget::Inline => self.inline.clone(),
            DispatchTarget::RetryingContextPool => Arc::new(InstrumentedPool::new(Arc::new(
                RetryPool::new(context.clone(), self.retry_interval, self.retry_max_attempts),
            ))),
        };

        let callback: Arc<dyn WorkerPool> = match assignment.callback {
            CallbackTarget::Inline => self.inline.clone(),
            CallbackTarget::InstrumentedLight => {
                Arc::new(InstrumentedPool::new(self.light.clone()))
            }
        };

        ResolvedPools {
            dispatch,
            callback,
            context,
        }
    }

    pub fn all(&self) -> [&Arc<dyn WorkerPool>; 3] {
        [&self.light, &self.blocking, &self.cpu_intensive]
    }

    pub fn stop(&self) {
        for pool in self.all() {
            pool.stop();
        }
    }
}
