//! Max-concurrency admission control at the pipeline entry
//!
//! The in-flight counter is incremented before it is checked. Two events
//! racing for the last slot may both increment; the one that lands above the
//! limit backs its increment out and is rejected.
//!
//! An admitted event's execution context owns an `AdmissionSlot`. The slot
//! goes back to the counter when the response completes or, failing that,
//! when the last copy of the event is dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use px_common::{BackPressureReason, UNBOUNDED};

use crate::event::Event;
use crate::strategy_metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(BackPressureReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Snapshot of the admission state
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStats {
    pub pipeline: String,
    /// `None` when unbounded
    pub max_concurrency: Option<usize>,
    pub eager_check: bool,
    pub in_flight: usize,
    pub admitted: u64,
    pub rejected: u64,
    pub resets: u64,
}

pub struct AdmissionController {
    pipeline: String,
    max_concurrency: usize,
    eager_check: bool,
    in_flight: Arc<AtomicUsize>,
    /// Bumped on reset so releases from earlier admissions are ignored
    epoch: Arc<AtomicU64>,
    admitted: AtomicU64,
    rejected: AtomicU64,
    logged_saturation: AtomicBool,
}

impl AdmissionController {
    pub fn new(pipeline: impl Into<String>, max_concurrency: usize, eager_check: bool) -> Self {
        Self {
            pipeline: pipeline.into(),
            max_concurrency,
            eager_check,
            in_flight: Arc::new(AtomicUsize::new(0)),
            epoch: Arc::new(AtomicU64::new(0)),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            logged_saturation: AtomicBool::new(false),
        }
    }

    /// Admit `event` or reject it with the reason.
    ///
    /// An admitted event holds its slot until its response completes or the
    /// event is dropped.
    pub fn try_admit(&self, event: &Event) -> Admission {
        if !self.eager_check {
            return Admission::Admitted;
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        if in_flight > self.max_concurrency {
            release(&self.in_flight);
            self.rejected.fetch_add(1, Ordering::SeqCst);
            strategy_metrics::record_admission(&self.pipeline, false);
            if !self.logged_saturation.swap(true, Ordering::SeqCst) {
                info!(
                    pipeline = %self.pipeline,
                    max_concurrency = self.max_concurrency,
                    "Max concurrency reached, rejecting events"
                );
            }
            return Admission::Rejected(BackPressureReason::MaxConcurrencyExceeded);
        }

        event.context().hold_admission_slot(AdmissionSlot {
            counter: self.in_flight.clone(),
            epoch: self.epoch.clone(),
            admitted_in: self.epoch.load(Ordering::SeqCst),
        });

        self.admitted.fetch_add(1, Ordering::SeqCst);
        strategy_metrics::record_admission(&self.pipeline, true);
        strategy_metrics::set_admission_in_flight(&self.pipeline, self.in_flight());
        Admission::Admitted
    }

    /// Force the counter to zero. Called when the pipeline stops.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let previous = self.in_flight.swap(0, Ordering::SeqCst);
        self.logged_saturation.store(false, Ordering::SeqCst);
        strategy_metrics::record_admission_reset(&self.pipeline);
        strategy_metrics::set_admission_in_flight(&self.pipeline, 0);
        debug!(pipeline = %self.pipeline, discarded = previous, "Admission counter reset");
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            pipeline: self.pipeline.clone(),
            max_concurrency: (self.max_concurrency != UNBOUNDED).then_some(self.max_concurrency),
            eager_check: self.eager_check,
            in_flight: self.in_flight(),
            admitted: self.admitted.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            resets: self.epoch.load(Ordering::SeqCst),
        }
    }
}

/// One admitted event's hold on the in-flight counter, returned on drop.
pub struct AdmissionSlot {
    counter: Arc<AtomicUsize>,
    epoch: Arc<AtomicU64>,
    admitted_in: u64,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        if self.epoch.load(Ordering::SeqCst) == self.admitted_in {
            release(&self.counter);
        }
    }
}

fn release(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
}
