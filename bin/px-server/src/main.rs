//! Proactor Server
//!
//! Runs one pipeline under the proactor processing strategy and serves the
//! monitoring and management API.
//!
//! The pipeline is a small demo chain, one component per pool family:
//! - `enrich` (LIGHT): stamps the payload with the receipt time
//! - `lookup` (BLOCKING): simulates a blocking store read
//! - `score` (CPU_INTENSIVE): computes a checksum over the payload
//!
//! ## Development Mode
//!
//! Set `PROACTOR_DEV_MODE=true` (or `dev_mode = true` in the config file) to
//! push a handful of sample events through the pipeline at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::HeaderValue;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use tokio::{net::TcpListener, signal};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use px_common::ProcessingType;
use px_config::{AppConfig, ConfigLoader};
use px_strategy::api::create_router;
use px_strategy::{Component, ComponentError, Event, FnComponent, ManagementServer, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    px_common::logging::init_logging("px-server");

    info!("Starting Proactor Server");

    let config = ConfigLoader::new().load()?;
    info!(
        pipeline = %config.pipeline.name,
        max_concurrency = ?config.strategy.max_concurrency,
        parallelism = config.strategy.parallelism,
        subscribers = config.strategy.subscriber_count,
        "Loaded configuration"
    );

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed, /metrics will be empty");
            None
        }
    };

    let pipeline = Arc::new(build_pipeline(&config));
    pipeline.start()?;

    if config.dev_mode {
        seed_sample_events(pipeline.clone());
    }

    let app = create_router(pipeline.clone(), prometheus)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.http.cors_origins));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    info!(addr = %addr, "Starting HTTP API server");

    let listener = TcpListener::bind(&addr).await?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("Proactor Server started. Press Ctrl+C to shutdown.");

    shutdown_signal().await;
    info!("Shutdown signal received...");

    pipeline.dispose().await;
    server_task.abort();

    info!("Proactor Server shutdown complete");
    Ok(())
}

fn build_pipeline(config: &AppConfig) -> Pipeline {
    let name = &config.pipeline.name;
    let management = if config.pipeline.management_enabled {
        ManagementServer::platform()
    } else {
        Arc::new(ManagementServer::new())
    };

    let mut builder = Pipeline::builder(name.clone())
        .strategy_config(config.strategy.clone())
        .management(management);
    for (index, component) in demo_components(name).into_iter().enumerate() {
        info!(
            index = index,
            location = %component.location(),
            processing_type = %component.processing_type(),
            "Adding component"
        );
        builder = builder.component(component);
    }
    builder.build()
}

fn demo_components(pipeline: &str) -> Vec<Arc<dyn Component>> {
    let location = |index: usize| format!("{}/processors/{}", pipeline, index);

    let enrich = FnComponent::new(location(0), ProcessingType::Light, |event: Event| async move {
        let mut payload = event.payload().clone();
        match payload.as_object_mut() {
            Some(fields) => {
                fields.insert("receivedAt".to_string(), json!(Utc::now().to_rfc3339()));
            }
            None => return Err(ComponentError::InvalidPayload("payload must be an object".to_string())),
        }
        Ok(event.with_payload(payload))
    })
    .non_blocking();

    let lookup = FnComponent::new(location(1), ProcessingType::Blocking, |event: Event| async move {
        std::thread::sleep(Duration::from_millis(5));
        let mut payload = event.payload().clone();
        payload["customer"] = json!({ "tier": "standard" });
        Ok::<_, ComponentError>(event.with_payload(payload))
    });

    let score = FnComponent::new(location(2), ProcessingType::CpuIntensive, |event: Event| async move {
        let mut payload = event.payload().clone();
        let checksum = payload
            .to_string()
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        payload["score"] = json!(checksum % 100);
        Ok::<_, ComponentError>(event.with_payload(payload))
    });

    vec![
        Arc::new(enrich) as Arc<dyn Component>,
        Arc::new(lookup),
        Arc::new(score),
    ]
}

fn seed_sample_events(pipeline: Arc<Pipeline>) {
    tokio::spawn(async move {
        for n in 0..5 {
            let event = Event::with_correlation_id(format!("sample-{}", n), json!({ "order": n }));
            match pipeline.process(event).await {
                Ok(processed) => info!(
                    correlation_id = %processed.correlation_id(),
                    payload = %processed.payload(),
                    "Sample event processed"
                ),
                Err(e) => warn!(error = %e, "Sample event failed"),
            }
        }
    });
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
