//! Pipeline - a named flow of components driven by a processing strategy
//!
//! Events enter through a bounded channel shared by `subscriber_count`
//! subscriber paths. Each path runs the assembled chain of every component
//! and completes each event's execution context with its outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use px_common::{BackPressureReason, StrategyConfig};

use crate::assembler::{assemble, EventStream};
use crate::component::Component;
use crate::error::StrategyError;
use crate::event::{Event, EventOutcome, ProcessingFailure};
use crate::management::ManagementServer;
use crate::pool::{PoolFactory, TokioPoolFactory};
use crate::strategy::ProactorStrategy;
use crate::Result;

/// How long `stop` waits for in-flight events to finish
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a non-blocking emit
#[derive(Debug)]
pub enum Emission {
    Accepted(PendingResponse),
    Rejected(BackPressureReason),
}

/// Response of an accepted event, available once its context completes
#[derive(Debug)]
pub struct PendingResponse {
    correlation_id: String,
    rx: oneshot::Receiver<EventOutcome>,
}

impl PendingResponse {
    fn subscribe(event: &Event) -> Self {
        let (tx, rx) = oneshot::channel();
        event.context().on_response(move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        Self {
            correlation_id: event.correlation_id().to_string(),
            rx,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub async fn wait(self) -> Result<Event> {
        match self.rx.await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(failure)) => Err(failure.error),
            Err(_) => Err(StrategyError::ResponseDropped),
        }
    }
}

struct Running {
    sender: mpsc::Sender<Event>,
    subscribers: Vec<JoinHandle<()>>,
}

pub struct Pipeline {
    name: String,
    components: Vec<Arc<dyn Component>>,
    strategy: Arc<ProactorStrategy>,
    running: Mutex<Option<Running>>,
    stopped: AtomicBool,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> &Arc<ProactorStrategy> {
        &self.strategy
    }

    pub fn components(&self) -> &[Arc<dyn Component>] {
        &self.components
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start the strategy, assemble every subscriber path and begin consuming.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        self.strategy.start()?;
        let chains = self
            .components
            .iter()
            .map(|component| {
                self.strategy
                    .on_component(component.as_ref())
                    .map(|chain| (component.clone(), chain))
            })
            .collect::<Result<Vec<_>>>()?;

        let config = self.strategy.config();
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let subscriber_count = config.subscriber_count.max(1);

        let subscribers = (0..subscriber_count)
            .map(|index| {
                let mut events: EventStream = stream::unfold(rx.clone(), |rx| async move {
                    let next = rx.lock().await.recv().await;
                    next.map(|event| (Ok::<_, ProcessingFailure>(event), rx))
                })
                .boxed();

                for (component, chain) in &chains {
                    events = assemble(
                        component.clone(),
                        events,
                        chain.orchestrator.clone(),
                        chain.fan_out,
                    );
                }

                let pipeline = self.name.clone();
                tokio::spawn(async move {
                    events
                        .for_each(|outcome| {
                            complete(outcome);
                            futures::future::ready(())
                        })
                        .await;
                    debug!(pipeline = %pipeline, subscriber = index, "Subscriber path finished");
                })
            })
            .collect();

        *running = Some(Running {
            sender: tx,
            subscribers,
        });
        self.stopped.store(false, Ordering::SeqCst);

        info!(
            pipeline = %self.name,
            components = self.components.len(),
            subscribers = subscriber_count,
            "Started pipeline"
        );
        Ok(())
    }

    fn sender(&self) -> Result<mpsc::Sender<Event>> {
        match self.running.lock().as_ref() {
            Some(running) => Ok(running.sender.clone()),
            None if self.stopped.load(Ordering::SeqCst) => Err(StrategyError::ShutdownInProgress),
            None => Err(StrategyError::NotStarted),
        }
    }

    /// Process `event` and wait for its outcome.
    ///
    /// Rejection by admission control is returned as
    /// `StrategyError::Rejected`.
    pub async fn process(&self, event: Event) -> Result<Event> {
        let sender = self.sender()?;
        self.strategy.check_backpressure_accepting(&event)?;
        let response = PendingResponse::subscribe(&event);
        enqueue(&sender, event).await?;
        response.wait().await
    }

    /// Offer `event` without raising on back-pressure.
    pub async fn emit(&self, event: Event) -> Result<Emission> {
        let sender = self.sender()?;
        if let Some(reason) = self.strategy.check_backpressure_emitting(&event) {
            return Ok(Emission::Rejected(reason));
        }
        let response = PendingResponse::subscribe(&event);
        enqueue(&sender, event).await?;
        Ok(Emission::Accepted(response))
    }

    /// Stop accepting events, reset admission and let in-flight events drain.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        self.stopped.store(true, Ordering::SeqCst);

        drop(running.sender);
        self.strategy.stop();

        let drain = futures::future::join_all(running.subscribers);
        if tokio::time::timeout(STOP_DRAIN_TIMEOUT, drain).await.is_err() {
            warn!(pipeline = %self.name, "In-flight events did not drain before timeout");
        }
        info!(pipeline = %self.name, "Stopped pipeline");
    }

    pub async fn dispose(&self) {
        self.stop().await;
        self.strategy.dispose();
    }
}

async fn enqueue(sender: &mpsc::Sender<Event>, event: Event) -> Result<()> {
    if let Err(mpsc::error::SendError(event)) = sender.send(event).await {
        let outcome = Err(ProcessingFailure::new(
            event.clone(),
            StrategyError::ShutdownInProgress,
        ));
        event.context().complete(&outcome);
        return Err(StrategyError::ShutdownInProgress);
    }
    Ok(())
}

fn complete(outcome: EventOutcome) {
    let context = match &outcome {
        Ok(event) => event.context().clone(),
        Err(failure) => {
            debug!(
                correlation_id = %failure.event.correlation_id(),
                error = %failure.error,
                "Event failed"
            );
            failure.event.context().clone()
        }
    };
    context.complete(&outcome);
}

pub struct PipelineBuilder {
    name: String,
    config: StrategyConfig,
    components: Vec<Arc<dyn Component>>,
    pool_factory: Option<Arc<dyn PoolFactory>>,
    management: Option<Arc<ManagementServer>>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: StrategyConfig::default(),
            components: Vec::new(),
            pool_factory: None,
            management: None,
        }
    }

    pub fn strategy_config(mut self, config: StrategyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn component(mut self, component: Arc<dyn Component>) -> Self {
        self.components.push(component);
        self
    }

    /// Defaults to a `TokioPoolFactory` over the strategy config
    pub fn pool_factory(mut self, pool_factory: Arc<dyn PoolFactory>) -> Self {
        self.pool_factory = Some(pool_factory);
        self
    }

    /// Defaults to `ManagementServer::platform()`
    pub fn management(mut self, management: Arc<ManagementServer>) -> Self {
        self.management = Some(management);
        self
    }

    pub fn build(self) -> Pipeline {
        let pool_factory = self
            .pool_factory
            .unwrap_or_else(|| Arc::new(TokioPoolFactory::new(self.config.clone())));
        let management = self.management.unwrap_or_else(ManagementServer::platform);

        Pipeline {
            strategy: Arc::new(ProactorStrategy::new(
                self.name.clone(),
                self.config,
                pool_factory,
                management,
            )),
            name: self.name,
            components: self.components,
            running: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }
}
