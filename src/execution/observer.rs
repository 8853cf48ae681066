use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::job::{JobId, JobStatus};

/// Lifecycle events emitted by the [`super::Orchestrator`].
#[derive(Debug, Clone)]
pub enum JobEvent {
    Submitted { id: JobId, operation: String },
    /// Dispatch waited for an in-flight slot.
    ThrottleWaited { duration: Duration },
    Started {
        id: JobId,
        agent: &'static str,
        queue_wait: Duration,
    },
    Completed { id: JobId, elapsed: Duration },
    Failed {
        id: JobId,
        reason: String,
        elapsed: Duration,
    },
    Cancelled { id: JobId },
    /// A cancel request arrived after the job left `pending`; it had no effect.
    CancelIgnored { id: JobId, status: JobStatus },
}

/// Observer hook for job lifecycle events.
pub trait JobObserver: Send + Sync {
    fn on_event(&self, event: &JobEvent);
}

/// Forwards job events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingJobObserver;

impl JobObserver for TracingJobObserver {
    fn on_event(&self, event: &JobEvent) {
        match event {
            JobEvent::Submitted { id, operation } => info!(job = %id, %operation, "job submitted"),
            JobEvent::ThrottleWaited { duration } => debug!(?duration, "dispatch throttled"),
            JobEvent::Started { id, agent, queue_wait } => {
                info!(job = %id, agent, ?queue_wait, "job started")
            }
            JobEvent::Completed { id, elapsed } => info!(job = %id, ?elapsed, "job completed"),
            JobEvent::Failed { id, reason, elapsed } => {
                warn!(job = %id, %reason, ?elapsed, "job failed")
            }
            JobEvent::Cancelled { id } => info!(job = %id, "job cancelled"),
            JobEvent::CancelIgnored { id, status } => {
                debug!(job = %id, %status, "cancel ignored, job no longer pending")
            }
        }
    }
}

/// Fans each event out to several observers, in order.
#[derive(Default)]
pub struct CompositeJobObserver {
    observers: Vec<Arc<dyn JobObserver>>,
}

impl CompositeJobObserver {
    pub fn new(observers: Vec<Arc<dyn JobObserver>>) -> Self {
        Self { observers }
    }

    pub fn push(&mut self, observer: Arc<dyn JobObserver>) {
        self.observers.push(observer);
    }
}

impl JobObserver for CompositeJobObserver {
    fn on_event(&self, event: &JobEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Live counters for an orchestrator.
///
/// The orchestrator updates these as jobs move through their lifecycle; callers can snapshot
/// them at any time.
#[derive(Debug, Default)]
pub struct JobMetrics {
    submitted: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    queue_wait_ns: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_submitted(&self) {
        let _ = self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn on_started(&self, queue_wait: Duration) {
        let _ = self.started.fetch_add(1, Ordering::SeqCst);
        let _ = self.queue_wait_ns.fetch_add(saturating_nanos(queue_wait), Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn on_finished(&self, succeeded: bool) {
        let counter = if succeeded { &self.completed } else { &self.failed };
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        let _ = self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// A started job whose outcome could not be recorded.
    pub(crate) fn on_abandoned(&self) {
        let _ = self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn on_cancelled(&self) {
        let _ = self.cancelled.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn on_throttle_wait(&self, d: Duration) {
        let _ = self.throttle_wait_ns.fetch_add(saturating_nanos(d), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> JobMetricsSnapshot {
        JobMetricsSnapshot {
            submitted: self.submitted.load(Ordering::SeqCst),
            started: self.started.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
            max_active: self.max_active.load(Ordering::SeqCst),
            queue_wait: Duration::from_nanos(self.queue_wait_ns.load(Ordering::SeqCst)),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
        }
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u128::from(u64::MAX)) as u64
}

/// Immutable snapshot of [`JobMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobMetricsSnapshot {
    pub submitted: u64,
    pub started: u64,
    pub completed: u64,
    /// Jobs that failed during execution; cancellations are counted separately.
    pub failed: u64,
    pub cancelled: u64,
    pub active: usize,
    pub max_active: usize,
    pub queue_wait: Duration,
    pub throttle_wait: Duration,
}

impl fmt::Display for JobMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted={}, started={}, completed={}, failed={}, cancelled={}, \
             active={}, max_active={}, queue_wait={:?}, throttle_wait={:?}",
            self.submitted,
            self.started,
            self.completed,
            self.failed,
            self.cancelled,
            self.active,
            self.max_active,
            self.queue_wait,
            self.throttle_wait
        )
    }
}
