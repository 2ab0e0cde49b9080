//! Pipeline Tests
//!
//! Tests for:
//! - Event ordering through an in-order chain
//! - Concurrent fan-out for blocking components
//! - Failures skipping downstream components
//! - Subscriber paths surviving a panicking inline component
//! - Lifecycle errors before start and after stop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use px_common::{ProcessingType, StrategyConfig};
use px_strategy::{
    ComponentError, Emission, Event, FnComponent, ManagementServer, Pipeline, PoolError,
    StrategyError,
};

fn isolated(name: &str) -> px_strategy::PipelineBuilder {
    Pipeline::builder(name).management(Arc::new(ManagementServer::new()))
}

#[tokio::test]
async fn test_light_chain_preserves_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let component = FnComponent::new("ordered/processors/0", ProcessingType::Light, move |event: Event| {
        let recorder = recorder.clone();
        async move {
            recorder.lock().push(event.payload()["n"].as_u64().unwrap_or_default());
            Ok::<_, ComponentError>(event)
        }
    });

    let pipeline = isolated("ordered").component(Arc::new(component)).build();
    pipeline.start().unwrap();

    let mut responses = Vec::new();
    for n in 0..20u64 {
        match pipeline.emit(Event::new(json!({ "n": n }))).await.unwrap() {
            Emission::Accepted(response) => responses.push(response),
            Emission::Rejected(reason) => panic!("unexpected rejection: {reason}"),
        }
    }
    for response in responses {
        response.wait().await.unwrap();
    }

    assert_eq!(*seen.lock(), (0..20).collect::<Vec<u64>>());
    pipeline.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_component_fans_out() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (active_in, peak_in) = (active.clone(), peak.clone());
    let component = FnComponent::new("fan/processors/0", ProcessingType::Blocking, move |event: Event| {
        let active = active_in.clone();
        let peak = peak_in.clone();
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, ComponentError>(event)
        }
    });

    let pipeline = isolated("fan")
        .strategy_config(StrategyConfig::default().with_max_concurrency(8))
        .component(Arc::new(component))
        .build();
    pipeline.start().unwrap();

    let chain = pipeline.strategy().orchestrators();
    assert_eq!(chain.len(), 1);

    let results = futures::future::join_all(
        (0..8).map(|n| pipeline.process(Event::new(json!({ "n": n })))),
    )
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(peak.load(Ordering::SeqCst) > 1);
    assert_eq!(pipeline.strategy().admission().in_flight(), 0);
    pipeline.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_event_skips_downstream_components() {
    let downstream_calls = Arc::new(AtomicUsize::new(0));
    let validate = FnComponent::new("orders/processors/0", ProcessingType::Light, |event: Event| async move {
        if event.payload().get("id").is_none() {
            return Err(ComponentError::InvalidPayload("missing id".to_string()));
        }
        Ok(event)
    });
    let calls = downstream_calls.clone();
    let store = FnComponent::new("orders/processors/1", ProcessingType::Io, move |event: Event| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ComponentError>(event)
        }
    });

    let pipeline = isolated("orders")
        .component(Arc::new(validate))
        .component(Arc::new(store))
        .build();
    pipeline.start().unwrap();

    let error = pipeline.process(Event::new(json!({ "total": 3 }))).await.unwrap_err();
    match error {
        StrategyError::Component { location, source } => {
            assert_eq!(location, "orders/processors/0");
            assert_eq!(source, ComponentError::InvalidPayload("missing id".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);

    let ok = pipeline.process(Event::new(json!({ "id": 1 }))).await.unwrap();
    assert_eq!(ok.payload(), &json!({ "id": 1 }));
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 1);

    pipeline.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_components_transform_payload_in_sequence() {
    let enrich = FnComponent::new("chain/processors/0", ProcessingType::Light, |event: Event| async move {
        let mut payload = event.payload().clone();
        payload["enriched"] = json!(true);
        Ok::<_, ComponentError>(event.with_payload(payload))
    });
    let score = FnComponent::new("chain/processors/1", ProcessingType::CpuIntensive, |event: Event| async move {
        let mut payload = event.payload().clone();
        let enriched = payload["enriched"].as_bool().unwrap_or(false);
        payload["score"] = json!(if enriched { 10 } else { 0 });
        Ok::<_, ComponentError>(event.with_payload(payload))
    });

    let pipeline = isolated("chain")
        .component(Arc::new(enrich))
        .component(Arc::new(score))
        .build();
    pipeline.start().unwrap();

    let event = Event::with_correlation_id("order-42", json!({}));
    let processed = pipeline.process(event).await.unwrap();

    assert_eq!(processed.correlation_id(), "order-42");
    assert_eq!(processed.payload(), &json!({ "enriched": true, "score": 10 }));
    pipeline.dispose().await;
}

#[tokio::test]
async fn test_process_before_start_and_after_stop() {
    let pipeline = isolated("lifecycle").build();

    assert_eq!(
        pipeline.process(Event::new(json!(null))).await.unwrap_err(),
        StrategyError::NotStarted
    );

    pipeline.start().unwrap();
    assert!(pipeline.is_running());
    pipeline.process(Event::new(json!(null))).await.unwrap();

    pipeline.stop().await;
    assert!(!pipeline.is_running());
    assert_eq!(
        pipeline.process(Event::new(json!(null))).await.unwrap_err(),
        StrategyError::ShutdownInProgress
    );
    assert!(matches!(
        pipeline.emit(Event::new(json!(null))).await,
        Err(StrategyError::ShutdownInProgress)
    ));

    pipeline.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_drains_in_flight_events() {
    let component = FnComponent::new("drain/processors/0", ProcessingType::Blocking, |event: Event| async move {
        std::thread::sleep(Duration::from_millis(100));
        Ok::<_, ComponentError>(event)
    });
    let pipeline = isolated("drain").component(Arc::new(component)).build();
    pipeline.start().unwrap();

    let response = match pipeline.emit(Event::new(json!({ "n": 1 }))).await.unwrap() {
        Emission::Accepted(response) => response,
        Emission::Rejected(reason) => panic!("unexpected rejection: {reason}"),
    };
    pipeline.stop().await;

    let processed = response.wait().await.unwrap();
    assert_eq!(processed.payload(), &json!({ "n": 1 }));
    assert!(processed.context().is_completed());

    pipeline.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_light_panic_leaves_subscriber_running() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let component = FnComponent::new("fragile/processors/0", ProcessingType::Light, move |event: Event| {
        let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
        async move {
            if first {
                panic!("first event blows up");
            }
            Ok::<_, ComponentError>(event)
        }
    });

    let pipeline = isolated("fragile").component(Arc::new(component)).build();
    pipeline.start().unwrap();

    let failed = pipeline.process(Event::new(json!({ "n": 1 }))).await;
    assert!(matches!(failed, Err(StrategyError::Pool(PoolError::Abandoned { .. }))));

    let next = pipeline.process(Event::new(json!({ "n": 2 }))).await.unwrap();
    assert_eq!(next.payload(), &json!({ "n": 2 }));
    assert!(pipeline.is_running());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    pipeline.dispose().await;
}
