//! Proactor HTTP API
//!
//! HTTP API endpoints for:
//! - Health and Prometheus metrics
//! - Orchestrator, pool and admission monitoring
//! - Management bean operations
//! - Event submission

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use px_common::{BackPressureReason, PoolKind, PoolStats};

use crate::admission::AdmissionStats;
use crate::error::{ComponentError, ManagementError, StrategyError};
use crate::event::Event;
use crate::orchestrator::{OrchestratorInfo, TraceStats};
use crate::pipeline::{Emission, Pipeline};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Installed Prometheus recorder, if any
    pub prometheus: Option<PrometheusHandle>,
}

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// UP when the pipeline is consuming events, DOWN otherwise
    pub status: String,
    pub version: String,
    pub pipeline: String,
}

/// Management operation invocation
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    /// e.g. `org.mule.orchestrator:type=basic,name=orchestrator`
    pub object_name: String,
    /// e.g. `ownScheduler`
    pub operation: String,
    #[serde(default)]
    pub argument: String,
}

/// Event submitted over HTTP
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    /// Generated when omitted
    pub correlation_id: Option<String>,
    #[schema(value_type = Object)]
    pub payload: Value,
}

/// Processed event
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub correlation_id: String,
    #[schema(value_type = Object)]
    pub payload: Value,
}

/// Dedicated pool assigned to a component
#[derive(Debug, Serialize, ToSchema)]
pub struct OwnSchedulerResponse {
    pub component: String,
    pub pool: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Proactor Processing Strategy API",
        version = "0.1.0",
        description = "HTTP API for pipeline monitoring, pool management and event submission"
    ),
    paths(
        health_handler,
        metrics_handler,
        orchestrators_handler,
        pool_stats_handler,
        admission_handler,
        invoke_handler,
        own_scheduler_handler,
        submit_event_handler,
    ),
    components(schemas(
        HealthResponse,
        InvokeRequest,
        EventRequest,
        EventResponse,
        OwnSchedulerResponse,
        OrchestratorInfo,
        TraceStats,
        PoolStats,
        PoolKind,
        AdmissionStats,
        BackPressureReason,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "monitoring", description = "Monitoring and metrics endpoints"),
        (name = "management", description = "Runtime pool management"),
        (name = "events", description = "Event submission"),
    )
)]
pub struct ApiDoc;

/// Create the router with all endpoints
pub fn create_router(pipeline: Arc<Pipeline>, prometheus: Option<PrometheusHandle>) -> Router {
    let state = AppState {
        pipeline,
        prometheus,
    };

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Monitoring
        .route("/monitoring/orchestrators", get(orchestrators_handler))
        .route("/monitoring/pools", get(pool_stats_handler))
        .route("/monitoring/admission", get(admission_handler))
        // Management
        .route("/management/invoke", post(invoke_handler))
        .route("/orchestrators/:component/own-scheduler", post(own_scheduler_handler))
        // Events
        .route("/events", post(submit_event_handler))
        .with_state(state)
}

// ============================================================================
// Health Endpoints
// ============================================================================

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Pipeline is running", body = HealthResponse),
        (status = 503, description = "Pipeline is not running", body = HealthResponse)
    )
)]
async fn health_handler(State(state): State<AppState>) -> Response {
    let running = state.pipeline.is_running();
    let body = HealthResponse {
        status: if running { "UP" } else { "DOWN" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pipeline: state.pipeline.name().to_string(),
    };
    let status = if running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// Prometheus metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "monitoring",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain")
    )
)]
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let output = state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
        .into_response()
}

// ============================================================================
// Monitoring Endpoints
// ============================================================================

/// Orchestrators of the running pipeline
#[utoipa::path(
    get,
    path = "/monitoring/orchestrators",
    tag = "monitoring",
    responses(
        (status = 200, description = "One entry per component", body = Vec<OrchestratorInfo>)
    )
)]
async fn orchestrators_handler(State(state): State<AppState>) -> Json<Vec<OrchestratorInfo>> {
    let infos = state
        .pipeline
        .strategy()
        .orchestrators()
        .iter()
        .map(|orchestrator| orchestrator.info())
        .collect();
    Json(infos)
}

/// Pool statistics
#[utoipa::path(
    get,
    path = "/monitoring/pools",
    tag = "monitoring",
    responses(
        (status = 200, description = "Statistics for every pool in use", body = Vec<PoolStats>)
    )
)]
async fn pool_stats_handler(State(state): State<AppState>) -> Json<Vec<PoolStats>> {
    Json(state.pipeline.strategy().pool_stats())
}

/// Admission control state
#[utoipa::path(
    get,
    path = "/monitoring/admission",
    tag = "monitoring",
    responses(
        (status = 200, description = "In-flight count and limits", body = AdmissionStats)
    )
)]
async fn admission_handler(State(state): State<AppState>) -> Json<AdmissionStats> {
    Json(state.pipeline.strategy().admission_stats())
}

// ============================================================================
// Management Endpoints
// ============================================================================

/// Invoke an operation on a registered management bean
#[utoipa::path(
    post,
    path = "/management/invoke",
    tag = "management",
    request_body = InvokeRequest,
    responses(
        (status = 200, description = "Operation result"),
        (status = 400, description = "Malformed object name or unknown operation"),
        (status = 404, description = "No bean registered under the object name"),
        (status = 500, description = "Operation failed")
    )
)]
async fn invoke_handler(
    State(state): State<AppState>,
    Json(request): Json<InvokeRequest>,
) -> Response {
    let management = state.pipeline.strategy().management();
    match management.invoke(&request.object_name, &request.operation, &request.argument) {
        Ok(result) => {
            info!(
                object_name = %request.object_name,
                operation = %request.operation,
                "Management operation invoked"
            );
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => {
            let status = match &e {
                ManagementError::MalformedObjectName(_) | ManagementError::UnknownOperation { .. } => {
                    StatusCode::BAD_REQUEST
                }
                ManagementError::NotFound(_) => StatusCode::NOT_FOUND,
                ManagementError::AlreadyRegistered(_) => StatusCode::CONFLICT,
                ManagementError::OperationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(object_name = %request.object_name, error = %e, "Management operation failed");
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Move a component onto a dedicated pool
#[utoipa::path(
    post,
    path = "/orchestrators/{component}/own-scheduler",
    tag = "management",
    params(
        ("component" = String, Path, description = "Component id or location")
    ),
    responses(
        (status = 200, description = "Component reassigned", body = OwnSchedulerResponse),
        (status = 404, description = "No such component"),
        (status = 500, description = "Pool could not be created")
    )
)]
async fn own_scheduler_handler(
    State(state): State<AppState>,
    Path(component): Path<String>,
) -> Response {
    match state.pipeline.strategy().manager().own_scheduler(&component) {
        Ok(Some(pool)) => (StatusCode::OK, Json(OwnSchedulerResponse { component, pool })).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Component not found: {}", component) })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ============================================================================
// Event Endpoints
// ============================================================================

/// Submit an event and wait for its outcome
#[utoipa::path(
    post,
    path = "/events",
    tag = "events",
    request_body = EventRequest,
    responses(
        (status = 200, description = "Event processed", body = EventResponse),
        (status = 422, description = "Component rejected the payload"),
        (status = 500, description = "Processing failed"),
        (status = 503, description = "Rejected by back-pressure or not running")
    )
)]
async fn submit_event_handler(
    State(state): State<AppState>,
    Json(request): Json<EventRequest>,
) -> Response {
    let event = match request.correlation_id {
        Some(correlation_id) => Event::with_correlation_id(correlation_id, request.payload),
        None => Event::new(request.payload),
    };

    match state.pipeline.emit(event).await {
        Ok(Emission::Accepted(response)) => {
            let correlation_id = response.correlation_id().to_string();
            match response.wait().await {
                Ok(event) => (
                    StatusCode::OK,
                    Json(EventResponse {
                        correlation_id,
                        payload: event.into_payload(),
                    }),
                )
                    .into_response(),
                Err(e) => error_response(&e, Some(&correlation_id)),
            }
        }
        Ok(Emission::Rejected(reason)) => {
            debug!(reason = %reason, "Event rejected by back-pressure");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Event rejected", "reason": reason })),
            )
                .into_response()
        }
        Err(e) => error_response(&e, None),
    }
}

fn error_response(error: &StrategyError, correlation_id: Option<&str>) -> Response {
    let status = match error {
        StrategyError::Rejected(_)
        | StrategyError::NotStarted
        | StrategyError::ShutdownInProgress
        | StrategyError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
        StrategyError::Component {
            source: ComponentError::InvalidPayload(_),
            ..
        } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "error": error.to_string(),
            "correlationId": correlation_id,
        })),
    )
        .into_response()
}
