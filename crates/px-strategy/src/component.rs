use std::future::Future;

use async_trait::async_trait;

use px_common::{ComponentId, ProcessingType};

use crate::error::ComponentError;
use crate::event::Event;

/// A processing step in a pipeline.
#[async_trait]
pub trait Component: Send + Sync {
    fn id(&self) -> ComponentId;

    /// Human-readable position in the flow, e.g. `orders/processors/2`
    fn location(&self) -> &str;

    fn processing_type(&self) -> ProcessingType;

    /// Whether `process` may park its thread
    fn is_blocking(&self) -> bool {
        true
    }

    async fn process(&self, event: Event) -> Result<Event, ComponentError>;
}

/// Component built from an async closure.
pub struct FnComponent<F> {
    id: ComponentId,
    location: String,
    processing_type: ProcessingType,
    blocking: bool,
    handler: F,
}

impl<F, Fut> FnComponent<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Event, ComponentError>> + Send + 'static,
{
    pub fn new(location: impl Into<String>, processing_type: ProcessingType, handler: F) -> Self {
        Self {
            id: ComponentId::new(),
            location: location.into(),
            processing_type,
            blocking: true,
            handler,
        }
    }

    /// Mark the component as never parking its thread.
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }
}

#[async_trait]
impl<F, Fut> Component for FnComponent<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Event, ComponentError>> + Send + 'static,
{
    fn id(&self) -> ComponentId {
        self.id
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    async fn process(&self, event: Event) -> Result<Event, ComponentError> {
        (self.handler)(event).await
    }
}
