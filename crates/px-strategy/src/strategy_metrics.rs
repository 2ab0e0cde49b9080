//! Prometheus-compatible metrics for the processing strategy
//!
//! Provides:
//! - Admission decisions and in-flight counts
//! - Orchestrator trace hooks and pool swaps
//! - Pool submissions, rejections and retries
//! - Component processing latency

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::pool::RejectReason;

/// Record an admission decision
pub fn record_admission(pipeline: &str, admitted: bool) {
    counter!(
        "px_admission_total",
        "pipeline" => pipeline.to_string(),
        "result" => if admitted { "admitted" } else { "rejected" }
    )
    .increment(1);
}

/// Update the in-flight event gauge
pub fn set_admission_in_flight(pipeline: &str, count: usize) {
    gauge!(
        "px_admission_in_flight",
        "pipeline" => pipeline.to_string()
    )
    .set(count as f64);
}

/// Record an admission counter reset
pub fn record_admission_reset(pipeline: &str) {
    counter!(
        "px_admission_resets_total",
        "pipeline" => pipeline.to_string()
    )
    .increment(1);
}

/// Record a trace hook firing
pub fn record_trace(location: &str, stage: &'static str) {
    counter!(
        "px_trace_events_total",
        "component" => location.to_string(),
        "stage" => stage
    )
    .increment(1);
}

/// Record component processing latency
pub fn record_component_duration(location: &str, success: bool, duration: Duration) {
    histogram!(
        "px_component_duration_seconds",
        "component" => location.to_string(),
        "success" => success.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record an orchestrator moving to a new pool
pub fn record_pool_swap(location: &str, pool: &str) {
    counter!(
        "px_pool_swaps_total",
        "component" => location.to_string(),
        "pool" => pool.to_string()
    )
    .increment(1);
}

/// Record a task accepted by a pool
pub fn record_pool_task_submitted(pool: &str) {
    counter!(
        "px_pool_tasks_submitted_total",
        "pool" => pool.to_string()
    )
    .increment(1);
}

/// Record a task refused by a pool
pub fn record_pool_task_rejected(pool: &str, reason: RejectReason) {
    counter!(
        "px_pool_tasks_rejected_total",
        "pool" => pool.to_string(),
        "reason" => match reason {
            RejectReason::Busy => "busy",
            RejectReason::Stopped => "stopped",
        }
    )
    .increment(1);
}

/// Update pool active tasks gauge
pub fn set_pool_active(pool: &str, count: usize) {
    gauge!(
        "px_pool_active_tasks",
        "pool" => pool.to_string()
    )
    .set(count as f64);
}

/// Record a submission retried because the pool was saturated
pub fn record_pool_retry(pool: &str) {
    counter!(
        "px_pool_submission_retries_total",
        "pool" => pool.to_string()
    )
    .increment(1);
}

/// Record a submission abandoned after exhausting its retries
pub fn record_pool_retries_exhausted(pool: &str) {
    counter!(
        "px_pool_retries_exhausted_total",
        "pool" => pool.to_string()
    )
    .increment(1);
}
