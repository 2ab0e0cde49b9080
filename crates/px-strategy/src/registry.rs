//! OrchestratorManager - live orchestrators of one strategy
//!
//! Keyed by component id with a secondary index by location, so management
//! calls can name a component either way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use px_common::{ComponentId, PoolKind};

use crate::component::Component;
use crate::error::PoolError;
use crate::management::{ManagementServer, OrchestratorBean, Registration, ORCHESTRATOR_OBJECT_NAME};
use crate::orchestrator::ExecutionOrchestrator;
use crate::pool::{PoolFactory, WorkerPool};

/// Concurrency of pools created by `own_scheduler`
pub const OWN_SCHEDULER_CONCURRENCY: usize = 5;

/// Name prefix of pools created by `own_scheduler`
pub const OWN_SCHEDULER_PREFIX: &str = "MAXWELL_DAEMON";

pub struct OrchestratorManager {
    orchestrators: DashMap<ComponentId, Arc<ExecutionOrchestrator>>,
    locations: DashMap<String, ComponentId>,
    pool_factory: Arc<dyn PoolFactory>,
    counter: AtomicU64,
    registration: Mutex<Option<(Arc<ManagementServer>, Registration)>>,
}

impl OrchestratorManager {
    pub fn new(pool_factory: Arc<dyn PoolFactory>) -> Self {
        Self {
            orchestrators: DashMap::new(),
            locations: DashMap::new(),
            pool_factory,
            counter: AtomicU64::new(0),
            registration: Mutex::new(None),
        }
    }

    /// Register the orchestrator bean with `server`.
    ///
    /// Failure to register is logged and otherwise ignored; the strategy
    /// runs without the management operation.
    pub fn initialise(self: &Arc<Self>, server: &Arc<ManagementServer>) {
        let bean = Arc::new(OrchestratorBean::new(Arc::downgrade(self)));
        match server.register(ORCHESTRATOR_OBJECT_NAME, bean) {
            Ok(registration) => {
                *self.registration.lock() = Some((server.clone(), registration));
            }
            Err(e) => {
                warn!(
                    object_name = ORCHESTRATOR_OBJECT_NAME,
                    error = %e,
                    "Could not register orchestrator management bean"
                );
            }
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registration.lock().is_some()
    }

    /// Orchestrator for `component`, created with the given pools on first use.
    pub fn get_or_create(
        &self,
        component: &dyn Component,
        dispatch: Arc<dyn WorkerPool>,
        callback: Arc<dyn WorkerPool>,
        context: Arc<dyn WorkerPool>,
    ) -> Arc<ExecutionOrchestrator> {
        let orchestrator = self
            .orchestrators
            .entry(component.id())
            .or_insert_with(|| {
                debug!(
                    component = %component.id(),
                    location = %component.location(),
                    processing_type = %component.processing_type(),
                    dispatch = %dispatch.name(),
                    context = %context.name(),
                    "Created orchestrator"
                );
                Arc::new(ExecutionOrchestrator::new(component, dispatch, callback, context))
            })
            .clone();

        self.locations
            .insert(component.location().to_string(), component.id());
        orchestrator
    }

    pub fn get(&self, id: &ComponentId) -> Option<Arc<ExecutionOrchestrator>> {
        self.orchestrators.get(id).map(|entry| entry.clone())
    }

    /// Look up by component id string or by location.
    pub fn find(&self, identity: &str) -> Option<Arc<ExecutionOrchestrator>> {
        if let Ok(id) = identity.parse::<ComponentId>() {
            if let Some(orchestrator) = self.get(&id) {
                return Some(orchestrator);
            }
        }
        let id = self.locations.get(identity).map(|entry| *entry.value())?;
        self.get(&id)
    }

    /// Move a component's dispatch and context work onto `pool`.
    pub fn reassign_pool(&self, id: &ComponentId, pool: Arc<dyn WorkerPool>) -> bool {
        match self.get(id) {
            Some(orchestrator) => {
                orchestrator.replace_pools(pool);
                true
            }
            None => false,
        }
    }

    /// Give a component a dedicated pool of its own.
    ///
    /// Returns the new pool's name, or `None` (creating nothing) when no
    /// orchestrator matches `identity`.
    pub fn own_scheduler(&self, identity: &str) -> Result<Option<String>, PoolError> {
        let Some(orchestrator) = self.find(identity) else {
            debug!(identity = %identity, "No orchestrator to give its own pool");
            return Ok(None);
        };

        let name = format!(
            "{}{}",
            OWN_SCHEDULER_PREFIX,
            self.counter.fetch_add(1, Ordering::SeqCst)
        );
        let pool = self.pool_factory.new_pool(
            PoolKind::Blocking,
            &name,
            Some(OWN_SCHEDULER_CONCURRENCY),
        )?;

        info!(
            component = %orchestrator.component_id(),
            location = %orchestrator.location(),
            pool = %name,
            "Assigning dedicated pool"
        );
        self.reassign_pool(&orchestrator.component_id(), pool);
        Ok(Some(name))
    }

    /// All orchestrators, ordered by location
    pub fn orchestrators(&self) -> Vec<Arc<ExecutionOrchestrator>> {
        let mut all: Vec<_> = self
            .orchestrators
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.location().cmp(b.location()));
        all
    }

    pub fn len(&self) -> usize {
        self.orchestrators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orchestrators.is_empty()
    }

    /// Dispose every orchestrator, clear the table and drop the bean.
    pub fn dispose(&self) {
        for orchestrator in self.orchestrators() {
            orchestrator.dispose();
        }
        self.orchestrators.clear();
        self.locations.clear();

        if let Some((server, registration)) = self.registration.lock().take() {
            server.unregister(&registration);
        }
    }
}
