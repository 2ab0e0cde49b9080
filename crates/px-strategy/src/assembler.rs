//! Wires one component into an event stream
//!
//! Per event: bind context pool, trace, dispatch the component onto the
//! dispatch pool, trace, hand the result to the callback pool, trace.
//! Events that already failed upstream pass through untouched.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{BoxStream, StreamExt};

use crate::component::Component;
use crate::error::StrategyError;
use crate::event::{Event, EventOutcome, ProcessingFailure};
use crate::orchestrator::ExecutionOrchestrator;
use crate::pool::run_on;
use crate::strategy_metrics;

/// Stream of events flowing between components
pub type EventStream = BoxStream<'static, EventOutcome>;

/// Append `component` to `upstream`.
///
/// With `fan_out == 1` events stay in order; otherwise up to `fan_out` events
/// are processed at once and complete in any order.
pub fn assemble(
    component: Arc<dyn Component>,
    upstream: EventStream,
    orchestrator: Arc<ExecutionOrchestrator>,
    fan_out: usize,
) -> EventStream {
    if fan_out <= 1 {
        upstream
            .then(move |item| process_event(component.clone(), orchestrator.clone(), item))
            .boxed()
    } else {
        upstream
            .map(move |item| process_event(component.clone(), orchestrator.clone(), item))
            .buffer_unordered(fan_out)
            .boxed()
    }
}

async fn process_event(
    component: Arc<dyn Component>,
    orchestrator: Arc<ExecutionOrchestrator>,
    item: EventOutcome,
) -> EventOutcome {
    let event = item?;

    bind_context_pool(&orchestrator, &event);
    orchestrator.trace_before_dispatch(&event);
    let processed = dispatch(&component, &orchestrator, event).await?;
    orchestrator.trace_after_component_processed(&processed);
    let processed = hand_to_callback(&orchestrator, processed).await?;
    orchestrator.trace_after_dispatch(&processed);

    Ok(processed)
}

/// Make the component's context pool visible to everything downstream.
fn bind_context_pool(orchestrator: &ExecutionOrchestrator, event: &Event) {
    event
        .context()
        .bind_processor_pool(orchestrator.context_pool());
}

async fn dispatch(
    component: &Arc<dyn Component>,
    orchestrator: &ExecutionOrchestrator,
    event: Event,
) -> EventOutcome {
    let pool = orchestrator.dispatch_pool();
    let original = event.clone();
    let location = component.location().to_string();
    let worker = component.clone();
    let started = Instant::now();

    let result = run_on(pool.as_ref(), async move { worker.process(event).await }).await;
    match result {
        Ok(Ok(processed)) => {
            strategy_metrics::record_component_duration(&location, true, started.elapsed());
            Ok(processed)
        }
        Ok(Err(source)) => {
            strategy_metrics::record_component_duration(&location, false, started.elapsed());
            Err(ProcessingFailure::new(
                original,
                StrategyError::Component { location, source },
            ))
        }
        Err(pool_error) => Err(ProcessingFailure::new(original, pool_error)),
    }
}

async fn hand_to_callback(orchestrator: &ExecutionOrchestrator, event: Event) -> EventOutcome {
    let pool = orchestrator.callback_pool();
    let fallback = event.clone();
    run_on(pool.as_ref(), async move { event })
        .await
        .map_err(|e| ProcessingFailure::new(fallback, e))
}
