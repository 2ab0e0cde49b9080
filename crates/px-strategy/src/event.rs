//! Events and their execution contexts

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use uuid::Uuid;

use crate::admission::AdmissionSlot;
use crate::error::StrategyError;
use crate::pool::WorkerPool;

/// Final result of running an event through a pipeline
pub type EventOutcome = std::result::Result<Event, ProcessingFailure>;

type ResponseCallback = Box<dyn FnOnce(&EventOutcome) + Send>;

/// An event that failed somewhere in the chain, with the event as it was
/// when the failure happened.
#[derive(Debug, Clone)]
pub struct ProcessingFailure {
    pub event: Event,
    pub error: StrategyError,
}

impl ProcessingFailure {
    pub fn new(event: Event, error: impl Into<StrategyError>) -> Self {
        Self {
            event,
            error: error.into(),
        }
    }
}

#[derive(Clone)]
pub struct Event {
    correlation_id: String,
    payload: Value,
    context: Arc<ExecutionContext>,
}

impl Event {
    /// New event with a generated correlation id and a fresh context
    pub fn new(payload: Value) -> Self {
        Self::with_correlation_id(Uuid::new_v4().to_string(), payload)
    }

    pub fn with_correlation_id(correlation_id: impl Into<String>, payload: Value) -> Self {
        let correlation_id = correlation_id.into();
        Self {
            context: ExecutionContext::new(correlation_id.clone()),
            correlation_id,
            payload,
        }
    }

    /// Same event (and context) carrying a different payload
    pub fn with_payload(&self, payload: Value) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            payload,
            context: self.context.clone(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("correlation_id", &self.correlation_id)
            .field("payload", &self.payload)
            .field("context", &self.context.id())
            .finish()
    }
}

struct ResponseState {
    completed: bool,
    callbacks: Vec<ResponseCallback>,
    slot: Option<AdmissionSlot>,
}

/// Per-event execution state shared by every copy of the event.
pub struct ExecutionContext {
    id: Uuid,
    correlation_id: String,
    parent: Option<Arc<ExecutionContext>>,
    response: Mutex<ResponseState>,
    open_children: AtomicUsize,
    processor_pool: RwLock<Option<Arc<dyn WorkerPool>>>,
    created_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(correlation_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(correlation_id.into(), None))
    }

    fn build(correlation_id: String, parent: Option<Arc<ExecutionContext>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id,
            parent,
            response: Mutex::new(ResponseState {
                completed: false,
                callbacks: Vec::new(),
                slot: None,
            }),
            open_children: AtomicUsize::new(0),
            processor_pool: RwLock::new(None),
            created_at: Utc::now(),
        }
    }

    /// Child context; the parent is not terminated until the child completes.
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        self.open_children.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self::build(self.correlation_id.clone(), Some(self.clone())))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Register a callback run once when the response completes.
    ///
    /// Callbacks run in registration order. Returns false (and drops the
    /// callback) when the response has already completed.
    pub fn on_response<F>(&self, callback: F) -> bool
    where
        F: FnOnce(&EventOutcome) + Send + 'static,
    {
        let mut response = self.response.lock();
        if response.completed {
            return false;
        }
        response.callbacks.push(Box::new(callback));
        true
    }

    /// Hold `slot` until the response completes or the context is dropped.
    ///
    /// A context that already completed returns the slot at once.
    pub fn hold_admission_slot(&self, slot: AdmissionSlot) -> bool {
        let mut response = self.response.lock();
        if response.completed {
            return false;
        }
        response.slot = Some(slot);
        true
    }

    /// Complete the response. Only the first call has any effect.
    ///
    /// The admission slot is returned before any callback runs.
    pub fn complete(&self, outcome: &EventOutcome) -> bool {
        let (slot, callbacks) = {
            let mut response = self.response.lock();
            if response.completed {
                return false;
            }
            response.completed = true;
            (response.slot.take(), std::mem::take(&mut response.callbacks))
        };

        drop(slot);
        for callback in callbacks {
            callback(outcome);
        }

        if let Some(parent) = &self.parent {
            parent.open_children.fetch_sub(1, Ordering::SeqCst);
        }
        true
    }

    pub fn is_completed(&self) -> bool {
        self.response.lock().completed
    }

    /// Response completed and no child context still open
    pub fn is_terminated(&self) -> bool {
        self.is_completed() && self.open_children.load(Ordering::SeqCst) == 0
    }

    /// Record the pool the most recent component runs its context work on.
    pub fn bind_processor_pool(&self, pool: Arc<dyn WorkerPool>) {
        *self.processor_pool.write() = Some(pool);
    }

    pub fn processor_pool(&self) -> Option<Arc<dyn WorkerPool>> {
        self.processor_pool.read().clone()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("correlation_id", &self.correlation_id)
            .field("completed", &self.is_completed())
            .field("open_children", &self.open_children.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_callbacks_run_once_in_order() {
        let event = Event::new(json!({"n": 1}));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            assert!(event.context().on_response(move |_| seen.lock().push(i)));
        }

        let outcome: EventOutcome = Ok(event.clone());
        assert!(event.context().complete(&outcome));
        assert!(!event.context().complete(&outcome));
        assert_eq!(*seen.lock(), vec![0, 1, 2]);

        assert!(!event.context().on_response(|_| {}));
    }

    #[test]
    fn test_parent_response_does_not_wait_for_children() {
        let event = Event::new(json!(null));
        let child = event.context().child();
        let fired = Arc::new(Mutex::new(false));
        let flag = fired.clone();
        event.context().on_response(move |_| *flag.lock() = true);

        event.context().complete(&Ok(event.clone()));
        assert!(*fired.lock());
        assert!(!event.context().is_terminated());

        let child_event = Event::with_correlation_id("child", json!(null));
        child.complete(&Ok(child_event));
        assert!(event.context().is_terminated());
    }

    #[test]
    fn test_with_payload_shares_context() {
        let event = Event::with_correlation_id("abc", json!(1));
        let next = event.with_payload(json!(2));
        assert_eq!(next.correlation_id(), "abc");
        assert_eq!(next.payload(), &json!(2));
        assert!(Arc::ptr_eq(event.context(), next.context()));
    }
}
