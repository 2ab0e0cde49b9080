//! HTTP API Tests
//!
//! Tests for:
//! - Health reflecting pipeline state
//! - Event submission and back-pressure responses
//! - Monitoring endpoints
//! - ownScheduler over HTTP and through the management invoke endpoint

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use px_common::{ProcessingType, StrategyConfig};
use px_strategy::api::create_router;
use px_strategy::{
    ComponentError, Event, FnComponent, ManagementServer, Pipeline, ORCHESTRATOR_OBJECT_NAME,
};

fn pipeline(config: StrategyConfig) -> Arc<Pipeline> {
    let enrich = FnComponent::new("api/processors/0", ProcessingType::Light, |event: Event| async move {
        if !event.payload().is_object() {
            return Err(ComponentError::InvalidPayload("expected an object".to_string()));
        }
        let mut payload = event.payload().clone();
        payload["enriched"] = json!(true);
        Ok(event.with_payload(payload))
    });
    let lookup = FnComponent::new("api/processors/1", ProcessingType::Blocking, |event: Event| async move {
        Ok::<_, ComponentError>(event)
    });

    Arc::new(
        Pipeline::builder("api")
            .strategy_config(config)
            .management(Arc::new(ManagementServer::new()))
            .component(Arc::new(enrich))
            .component(Arc::new(lookup))
            .build(),
    )
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health_follows_pipeline_state() {
    let pipeline = pipeline(StrategyConfig::default());
    let app = create_router(pipeline.clone(), None);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "DOWN");

    pipeline.start().unwrap();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
    assert_eq!(body["pipeline"], "api");

    pipeline.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submit_event_runs_the_chain() {
    let pipeline = pipeline(StrategyConfig::default());
    pipeline.start().unwrap();
    let app = create_router(pipeline.clone(), None);

    let (status, body) = send(
        &app,
        post_json("/events", json!({ "correlationId": "c-1", "payload": { "sku": "A1" } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correlationId"], "c-1");
    assert_eq!(body["payload"], json!({ "sku": "A1", "enriched": true }));

    let (status, _) = send(&app, post_json("/events", json!({ "payload": 5 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    pipeline.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submit_event_when_not_started_is_unavailable() {
    let pipeline = pipeline(StrategyConfig::default());
    let app = create_router(pipeline, None);

    let (status, _) = send(&app, post_json("/events", json!({ "payload": {} }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submit_event_rejected_at_capacity() {
    let pipeline = pipeline(StrategyConfig::default().with_max_concurrency(1));
    pipeline.start().unwrap();
    let app = create_router(pipeline.clone(), None);

    // Occupy the only slot without completing it.
    let held = Event::new(json!({}));
    pipeline.strategy().check_backpressure_accepting(&held).unwrap();

    let (status, body) = send(&app, post_json("/events", json!({ "payload": {} }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    let (_, admission) = send(&app, get("/monitoring/admission")).await;
    assert_eq!(admission["inFlight"], 1);
    assert_eq!(admission["maxConcurrency"], 1);
    assert_eq!(admission["rejected"], 1);

    held.context().complete(&Ok(held.clone()));
    let (status, _) = send(&app, post_json("/events", json!({ "payload": {} }))).await;
    assert_eq!(status, StatusCode::OK);

    pipeline.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_monitoring_lists_orchestrators_and_pools() {
    let pipeline = pipeline(StrategyConfig::default());
    pipeline.start().unwrap();
    let app = create_router(pipeline.clone(), None);

    let (status, body) = send(&app, get("/monitoring/orchestrators")).await;
    assert_eq!(status, StatusCode::OK);
    let orchestrators = body.as_array().unwrap();
    assert_eq!(orchestrators.len(), 2);
    assert_eq!(orchestrators[0]["location"], "api/processors/0");
    assert_eq!(orchestrators[0]["processingType"], "LIGHT");
    assert_eq!(orchestrators[1]["contextPool"], "pipeline.BLOCKING");

    let (status, body) = send(&app, get("/monitoring/pools")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|pool| pool["name"].as_str())
        .collect();
    assert!(names.contains(&"pipeline.LIGHT"));
    assert!(names.contains(&"pipeline.BLOCKING"));
    assert!(names.contains(&"pipeline.CPU_INTENSIVE"));

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    pipeline.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_own_scheduler_endpoint() {
    let pipeline = pipeline(StrategyConfig::default());
    pipeline.start().unwrap();
    let app = create_router(pipeline.clone(), None);

    let (status, _) = send(&app, post_json("/orchestrators/missing/own-scheduler", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let id = pipeline
        .strategy()
        .manager()
        .find("api/processors/1")
        .unwrap()
        .component_id();
    let (status, body) = send(
        &app,
        post_json(&format!("/orchestrators/{id}/own-scheduler"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pool"], "MAXWELL_DAEMON0");

    let (status, body) = send(
        &app,
        post_json(
            "/management/invoke",
            json!({
                "objectName": ORCHESTRATOR_OBJECT_NAME,
                "operation": "ownScheduler",
                "argument": id.to_string(),
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pool"], "MAXWELL_DAEMON1");

    let (status, _) = send(
        &app,
        post_json(
            "/management/invoke",
            json!({ "objectName": "not-an-object-name", "operation": "ownScheduler", "argument": "" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, get("/monitoring/orchestrators")).await;
    assert_eq!(body[1]["dispatchPool"], "MAXWELL_DAEMON1");
    assert_eq!(body[1]["swapCount"], 2);

    pipeline.dispose().await;
}
