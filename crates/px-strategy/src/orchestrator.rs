//! ExecutionOrchestrator - the three pools one component runs on
//!
//! The dispatch pool runs the component, the callback pool receives its
//! result, and the context pool is bound into the event's execution context.
//! An operator can move the dispatch and context pools onto a new pool while
//! the pipeline keeps running.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use px_common::{ComponentId, ProcessingType};

use crate::component::Component;
use crate::event::Event;
use crate::pool::{PoolHandle, WorkerPool};
use crate::strategy_metrics;

#[derive(Default)]
struct TraceCounters {
    before_dispatch: AtomicU64,
    component_processed: AtomicU64,
    after_dispatch: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TraceStats {
    pub before_dispatch: u64,
    pub component_processed: u64,
    pub after_dispatch: u64,
}

/// Serializable view of one orchestrator
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorInfo {
    pub component_id: ComponentId,
    pub location: String,
    pub processing_type: ProcessingType,
    pub dispatch_pool: String,
    pub callback_pool: String,
    pub context_pool: String,
    pub swap_count: u64,
    pub trace: TraceStats,
    pub created_at: DateTime<Utc>,
}

pub struct ExecutionOrchestrator {
    component_id: ComponentId,
    location: String,
    processing_type: ProcessingType,
    dispatch: PoolHandle,
    callback: PoolHandle,
    context: PoolHandle,
    /// Serializes replacements. Readers load each handle on its own, so an
    /// event crossing a swap may see the new dispatch pool with the old
    /// context pool.
    swap_lock: Mutex<()>,
    trace: TraceCounters,
    created_at: DateTime<Utc>,
    disposed: AtomicBool,
}

impl ExecutionOrchestrator {
    pub fn new(
        component: &dyn Component,
        dispatch: Arc<dyn WorkerPool>,
        callback: Arc<dyn WorkerPool>,
        context: Arc<dyn WorkerPool>,
    ) -> Self {
        Self {
            component_id: component.id(),
            location: component.location().to_string(),
            processing_type: component.processing_type(),
            dispatch: PoolHandle::new(dispatch),
            callback: PoolHandle::new(callback),
            context: PoolHandle::new(context),
            swap_lock: Mutex::new(()),
            trace: TraceCounters::default(),
            created_at: Utc::now(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    pub fn dispatch_pool(&self) -> Arc<dyn WorkerPool> {
        self.dispatch.current()
    }

    pub fn callback_pool(&self) -> Arc<dyn WorkerPool> {
        self.callback.current()
    }

    pub fn context_pool(&self) -> Arc<dyn WorkerPool> {
        self.context.current()
    }

    pub fn trace_before_dispatch(&self, event: &Event) {
        if self.dispatch.is_inline() {
            return;
        }
        self.trace.before_dispatch.fetch_add(1, Ordering::Relaxed);
        strategy_metrics::record_trace(&self.location, "before_dispatch");
        debug!(
            correlation_id = %event.correlation_id(),
            location = %self.location,
            pool = %self.dispatch.name(),
            "Dispatching event"
        );
    }

    pub fn trace_after_component_processed(&self, event: &Event) {
        self.trace.component_processed.fetch_add(1, Ordering::Relaxed);
        strategy_metrics::record_trace(&self.location, "component_processed");
        debug!(
            correlation_id = %event.correlation_id(),
            location = %self.location,
            "Component processed event"
        );
    }

    pub fn trace_after_dispatch(&self, event: &Event) {
        if self.dispatch.is_inline() {
            return;
        }
        self.trace.after_dispatch.fetch_add(1, Ordering::Relaxed);
        strategy_metrics::record_trace(&self.location, "after_dispatch");
        debug!(
            correlation_id = %event.correlation_id(),
            location = %self.location,
            pool = %self.callback.name(),
            "Event handed back from dispatch"
        );
    }

    /// Move dispatch and context work onto `pool`.
    ///
    /// Work already submitted to the previous pools keeps running there.
    /// Concurrent swaps are applied one after the other; the two handles are
    /// not replaced as a single step.
    pub fn replace_pools(&self, pool: Arc<dyn WorkerPool>) {
        let _guard = self.swap_lock.lock();
        let previous_dispatch = self.dispatch.replace(pool.clone());
        let previous_context = self.context.replace(pool.clone());

        strategy_metrics::record_pool_swap(&self.location, &pool.name());
        info!(
            component = %self.component_id,
            location = %self.location,
            from_dispatch = %previous_dispatch.name(),
            from_context = %previous_context.name(),
            to = %pool.name(),
            "Replaced orchestrator pools"
        );
    }

    pub fn swap_count(&self) -> u64 {
        self.dispatch.swap_count()
    }

    pub fn trace_stats(&self) -> TraceStats {
        TraceStats {
            before_dispatch: self.trace.before_dispatch.load(Ordering::Relaxed),
            component_processed: self.trace.component_processed.load(Ordering::Relaxed),
            after_dispatch: self.trace.after_dispatch.load(Ordering::Relaxed),
        }
    }

    pub fn info(&self) -> OrchestratorInfo {
        OrchestratorInfo {
            component_id: self.component_id,
            location: self.location.clone(),
            processing_type: self.processing_type,
            dispatch_pool: self.dispatch.name(),
            callback_pool: self.callback.name(),
            context_pool: self.context.name(),
            swap_count: self.swap_count(),
            trace: self.trace_stats(),
            created_at: self.created_at,
        }
    }

    /// Stop the pools behind all three handles. Only the first call acts.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.dispatch.stop();
        self.callback.stop();
        self.context.stop();
        debug!(location = %self.location, "Disposed orchestrator");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
