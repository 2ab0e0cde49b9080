//! Proactor Processing Strategy
//!
//! This crate runs chains of components against a stream of events with:
//! - Pools: tokio-backed, inline, retrying and instrumented pools behind swappable handles
//! - AdmissionController: max-concurrency admission at the pipeline entry
//! - Parallelism policy: fan-out per component chain
//! - Pool selection: dispatch, callback and context pools per processing type
//! - ExecutionOrchestrator: the pools one component runs on, replaceable at runtime
//! - OrchestratorManager: registry of orchestrators with the `ownScheduler` operation
//! - ManagementServer: process-wide registry of management beans
//! - Assembler and Pipeline: wiring components into subscriber paths
//! - API: HTTP endpoints for monitoring, management and event submission

pub mod admission;
pub mod api;
pub mod assembler;
pub mod component;
pub mod error;
pub mod event;
pub mod management;
pub mod orchestrator;
pub mod parallelism;
pub mod pipeline;
pub mod policy;
pub mod pool;
pub mod registry;
pub mod strategy;
pub mod strategy_metrics;

pub use admission::{Admission, AdmissionController, AdmissionSlot, AdmissionStats};
pub use assembler::{assemble, EventStream};
pub use component::{Component, FnComponent};
pub use error::{ComponentError, ManagementError, PoolError, StrategyError};
pub use event::{Event, EventOutcome, ExecutionContext, ProcessingFailure};
pub use management::{
    ManagedBean, ManagementServer, OrchestratorBean, Registration, ORCHESTRATOR_OBJECT_NAME,
    OWN_SCHEDULER_OPERATION,
};
pub use orchestrator::{ExecutionOrchestrator, OrchestratorInfo, TraceStats};
pub use parallelism::{chain_parallelism, BASE_CHAIN_PARALLELISM};
pub use pipeline::{Emission, PendingResponse, Pipeline, PipelineBuilder};
pub use policy::{CallbackTarget, ContextTarget, DispatchTarget, PoolAssignment, StrategyPools};
pub use pool::{
    run_on, InlinePool, InstrumentedPool, PoolFactory, PoolHandle, RejectReason, Rejected,
    RetryPool, Task, TaskPool, TokioPoolFactory, WorkerPool,
};
pub use registry::{OrchestratorManager, OWN_SCHEDULER_CONCURRENCY, OWN_SCHEDULER_PREFIX};
pub use strategy::{ComponentChain, ProactorStrategy};

pub type Result<T> = std::result::Result<T, StrategyError>;
