//! ProactorStrategy - per-pipeline processing strategy
//!
//! Owns the lightweight, blocking and CPU-intensive pools, the admission
//! controller and the orchestrator registry, and decides per component which
//! pools it runs on and how far its chain fans out.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::info;

use px_common::{BackPressureReason, PoolKind, PoolStats, StrategyConfig};

use crate::admission::{Admission, AdmissionController, AdmissionStats};
use crate::component::Component;
use crate::error::StrategyError;
use crate::event::Event;
use crate::management::ManagementServer;
use crate::orchestrator::ExecutionOrchestrator;
use crate::parallelism::chain_parallelism;
use crate::policy::{PoolAssignment, StrategyPools};
use crate::pool::{PoolFactory, RetryPool, WorkerPool};
use crate::registry::OrchestratorManager;
use crate::Result;

/// What the strategy decided for one component
#[derive(Clone)]
pub struct ComponentChain {
    pub orchestrator: Arc<ExecutionOrchestrator>,
    pub fan_out: usize,
}

pub struct ProactorStrategy {
    name: String,
    config: StrategyConfig,
    pool_factory: Arc<dyn PoolFactory>,
    management: Arc<ManagementServer>,
    admission: AdmissionController,
    manager: Arc<OrchestratorManager>,
    pools: RwLock<Option<StrategyPools>>,
}

impl ProactorStrategy {
    pub fn new(
        name: impl Into<String>,
        config: StrategyConfig,
        pool_factory: Arc<dyn PoolFactory>,
        management: Arc<ManagementServer>,
    ) -> Self {
        let name = name.into();
        let admission = AdmissionController::new(
            name.clone(),
            config.effective_max_concurrency(),
            config.max_concurrency_eager_check,
        );
        Self {
            manager: Arc::new(OrchestratorManager::new(pool_factory.clone())),
            name,
            config,
            pool_factory,
            management,
            admission,
            pools: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Create the strategy's pools and register the management bean.
    pub fn start(&self) -> Result<()> {
        let mut pools = self.pools.write();
        if pools.is_some() {
            return Ok(());
        }

        let retry_interval = Duration::from_millis(self.config.busy_retry_interval_ms);
        let retry_max_attempts = self.config.busy_retry_max_attempts;

        let light = self.create_pool(PoolKind::Light)?;
        let light: Arc<dyn WorkerPool> =
            Arc::new(RetryPool::new(light, retry_interval, retry_max_attempts));
        let blocking = self.create_pool(PoolKind::Blocking)?;
        let cpu_intensive = self.create_pool(PoolKind::CpuIntensive)?;

        *pools = Some(StrategyPools::new(
            light,
            blocking,
            cpu_intensive,
            retry_interval,
            retry_max_attempts,
        ));
        drop(pools);

        self.manager.initialise(&self.management);

        info!(
            strategy = %self.name,
            max_concurrency = ?self.config.max_concurrency,
            parallelism = self.config.parallelism,
            subscribers = self.config.subscriber_count,
            "Started processing strategy"
        );
        Ok(())
    }

    fn create_pool(&self, kind: PoolKind) -> Result<Arc<dyn WorkerPool>> {
        let name = format!("{}.{}", self.config.name_prefix, kind);
        Ok(self.pool_factory.new_pool(kind, &name, None)?)
    }

    pub fn is_started(&self) -> bool {
        self.pools.read().is_some()
    }

    /// Choose pools and fan-out for `component`.
    pub fn on_component(&self, component: &dyn Component) -> Result<ComponentChain> {
        let pools = self.pools.read().clone().ok_or(StrategyError::NotStarted)?;

        let resolved = pools.resolve(PoolAssignment::for_type(component.processing_type()));
        let orchestrator = self.manager.get_or_create(
            component,
            resolved.dispatch,
            resolved.callback,
            resolved.context,
        );
        let fan_out = chain_parallelism(
            component.processing_type(),
            self.config.effective_max_concurrency(),
            self.config.parallelism,
            self.config.subscriber_count,
            component.is_blocking(),
        );

        Ok(ComponentChain {
            orchestrator,
            fan_out,
        })
    }

    /// Admission check for callers that wait for the outcome.
    pub fn check_backpressure_accepting(&self, event: &Event) -> Result<()> {
        match self.admission.try_admit(event) {
            Admission::Admitted => Ok(()),
            Admission::Rejected(reason) => Err(StrategyError::Rejected(reason)),
        }
    }

    /// Admission check returning the rejection reason as a value.
    pub fn check_backpressure_emitting(&self, event: &Event) -> Option<BackPressureReason> {
        match self.admission.try_admit(event) {
            Admission::Admitted => None,
            Admission::Rejected(reason) => Some(reason),
        }
    }

    /// Reset admission. Pools stay up so in-flight work can finish.
    pub fn stop(&self) {
        self.admission.reset();
        info!(strategy = %self.name, "Stopped processing strategy");
    }

    /// Dispose orchestrators, drop the management bean and stop the pools.
    pub fn dispose(&self) {
        self.manager.dispose();
        if let Some(pools) = self.pools.write().take() {
            pools.stop();
        }
        info!(strategy = %self.name, "Disposed processing strategy");
    }

    pub fn manager(&self) -> &Arc<OrchestratorManager> {
        &self.manager
    }

    pub fn management(&self) -> &Arc<ManagementServer> {
        &self.management
    }

    pub fn orchestrators(&self) -> Vec<Arc<ExecutionOrchestrator>> {
        self.manager.orchestrators()
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn admission_stats(&self) -> AdmissionStats {
        self.admission.stats()
    }

    /// Stats for the strategy's pools and any pool an orchestrator moved to
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<PoolStats> = Vec::new();
        let mut push = |pool: &Arc<dyn WorkerPool>| {
            if let Some(s) = pool.stats() {
                if !stats.iter().any(|existing| existing.name == s.name) {
                    stats.push(s);
                }
            }
        };

        if let Some(pools) = self.pools.read().as_ref() {
            for pool in pools.all() {
                push(pool);
            }
        }
        for orchestrator in self.manager.orchestrators() {
            push(&orchestrator.dispatch_pool());
            push(&orchestrator.context_pool());
        }

        stats
    }
}
