use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod logging;

/// Sentinel for "no concurrency limit" / "no fan-out cap".
pub const UNBOUNDED: usize = usize::MAX;

// ============================================================================
// Component Classification
// ============================================================================

/// How a component behaves when it runs, which decides the pools it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingType {
    /// Short, non-blocking CPU work
    Light,
    /// Non-blocking work that completes on a callback
    LightAsync,
    /// Long-running CPU work
    CpuIntensive,
    /// Work that blocks the calling thread
    Blocking,
    /// Blocking reads/writes against an external resource
    Io,
}

impl ProcessingType {
    pub const ALL: [ProcessingType; 5] = [
        ProcessingType::Light,
        ProcessingType::LightAsync,
        ProcessingType::CpuIntensive,
        ProcessingType::Blocking,
        ProcessingType::Io,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingType::Light => "LIGHT",
            ProcessingType::LightAsync => "LIGHT_ASYNC",
            ProcessingType::CpuIntensive => "CPU_INTENSIVE",
            ProcessingType::Blocking => "BLOCKING",
            ProcessingType::Io => "IO",
        }
    }
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of pool a pool factory can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolKind {
    Light,
    CpuIntensive,
    Blocking,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Light => "LIGHT",
            PoolKind::CpuIntensive => "CPU_INTENSIVE",
            PoolKind::Blocking => "BLOCKING",
        }
    }

    /// Whether tasks of this kind may park their thread.
    pub fn runs_on_dedicated_threads(&self) -> bool {
        !matches!(self, PoolKind::Light)
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an event was refused at the pipeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackPressureReason {
    MaxConcurrencyExceeded,
}

impl fmt::Display for BackPressureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackPressureReason::MaxConcurrencyExceeded => f.write_str("MAX_CONCURRENCY_EXCEEDED"),
        }
    }
}

// ============================================================================
// Component Identity
// ============================================================================

/// Stable identity assigned to a component when the chain is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ComponentId(Uuid);

impl ComponentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ComponentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ComponentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Sizing for one pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum tasks running at once
    pub concurrency: usize,
    /// Submission queue size; derived from concurrency when unset
    pub queue_capacity: Option<usize>,
}

impl PoolSettings {
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency, queue_capacity: None }
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = Some(queue_capacity);
        self
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Settings for one processing strategy (one pipeline instance).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct StrategyConfig {
    /// Prefix for the names of the pools this strategy creates
    pub name_prefix: String,
    /// Events allowed in flight at once; `None` means unbounded
    pub max_concurrency: Option<usize>,
    /// Count in-flight events at the entry and reject above the limit
    pub max_concurrency_eager_check: bool,
    /// Base parallelism of the pipeline
    pub parallelism: usize,
    /// Concurrent subscriber paths consuming the pipeline input
    pub subscriber_count: usize,
    /// Capacity of the pipeline input buffer
    pub buffer_size: usize,
    /// Delay between submission attempts while a pool queue is full
    pub busy_retry_interval_ms: u64,
    /// Attempts before a saturated submission is treated as fatal
    pub busy_retry_max_attempts: u32,
    pub light_pool: PoolSettings,
    pub blocking_pool: PoolSettings,
    pub cpu_intensive_pool: PoolSettings,
}

impl StrategyConfig {
    /// Effective concurrency limit, `UNBOUNDED` when none is configured.
    pub fn effective_max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or(UNBOUNDED)
    }

    pub fn pool_settings(&self, kind: PoolKind) -> &PoolSettings {
        match kind {
            PoolKind::Light => &self.light_pool,
            PoolKind::CpuIntensive => &self.cpu_intensive_pool,
            PoolKind::Blocking => &self.blocking_pool,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name_prefix: "pipeline".to_string(),
            max_concurrency: None,
            max_concurrency_eager_check: true,
            parallelism: 1,
            subscriber_count: 1,
            buffer_size: 256,
            busy_retry_interval_ms: 2,
            busy_retry_max_attempts: 1000,
            light_pool: PoolSettings::new(16),
            blocking_pool: PoolSettings::new(64),
            cpu_intensive_pool: PoolSettings::new(4),
        }
    }
}

// ============================================================================
// Monitoring Types
// ============================================================================

/// Point-in-time statistics for a pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub name: String,
    pub kind: PoolKind,
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub active: usize,
    pub submitted: u64,
    pub completed: u64,
    pub stopped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_type_serde() {
        let json = serde_json::to_string(&ProcessingType::LightAsync).unwrap();
        assert_eq!(json, "\"LIGHT_ASYNC\"");
        let parsed: ProcessingType = serde_json::from_str("\"CPU_INTENSIVE\"").unwrap();
        assert_eq!(parsed, ProcessingType::CpuIntensive);
    }

    #[test]
    fn test_component_id_round_trips_through_display() {
        let id = ComponentId::new();
        let parsed: ComponentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("orders/processors/0".parse::<ComponentId>().is_err());
    }

    #[test]
    fn test_strategy_defaults() {
        let config = StrategyConfig::default();
        assert_eq!(config.effective_max_concurrency(), UNBOUNDED);
        assert!(config.max_concurrency_eager_check);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.pool_settings(PoolKind::Blocking).concurrency, 64);

        let bounded = config.with_max_concurrency(10);
        assert_eq!(bounded.effective_max_concurrency(), 10);
    }

    #[test]
    fn test_back_pressure_reason_display() {
        assert_eq!(
            BackPressureReason::MaxConcurrencyExceeded.to_string(),
            "MAX_CONCURRENCY_EXCEEDED"
        );
    }
}
