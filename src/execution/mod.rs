//! Job orchestration: submission, dispatch, execution and the audit trail.
//!
//! This module sits "above" [`crate::ingestion`] and [`crate::processing`] and provides:
//!
//! - A queue handoff between submission and execution, so submitting never waits on a job
//! - A bounded worker pool with a limit on jobs in flight
//! - Per-job single-writer guards that make dispatch and cancellation mutually exclusive
//! - Real-time metrics + observer hooks for monitoring
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sheet_jobs::execution::{
//!     InMemoryJobStore, InMemorySource, JobRequest, JobStatus, Orchestrator, OrchestratorOptions,
//! };
//! use sheet_jobs::processing::HeuristicNarrator;
//!
//! let source = Arc::new(InMemorySource::new());
//! source.insert("people.csv", "Name,Email\nAnn,ann@example.com\n");
//!
//! let orchestrator = Orchestrator::new(
//!     source,
//!     Arc::new(InMemoryJobStore::new()),
//!     Arc::new(HeuristicNarrator),
//!     OrchestratorOptions::default(),
//! )
//! .unwrap();
//!
//! let job = orchestrator.submit(JobRequest::new("people.csv", "extract")).unwrap();
//! let done = orchestrator.wait_for_terminal(job.id, Duration::from_secs(10)).unwrap();
//! assert_eq!(done.status, JobStatus::Completed);
//! ```

mod job;
mod observer;
mod semaphore;
mod source;
mod store;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::error::{JobError, JobResult};
use crate::ingestion::decode_dataset;
use crate::processing::{agent_catalog, AgentInfo, Operation, OperationRequest, TextGenerator};

pub use job::{
    AgentLogEntry, JobDetails, JobId, JobStatus, LogAction, NewAgentLogEntry, ProcessingJob,
    CANCELLED_REASON, SYSTEM_AGENT,
};
pub use observer::{
    CompositeJobObserver, JobEvent, JobMetrics, JobMetricsSnapshot, JobObserver,
    TracingJobObserver,
};
pub use source::{DatasetSource, DirectorySource, InMemorySource};
pub use store::{InMemoryJobStore, JobStore};

use semaphore::Semaphore;

/// Configuration for the [`Orchestrator`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestratorOptions {
    /// Number of worker threads executing jobs.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on jobs executing at once.
    ///
    /// This is an additional throttle on top of `num_threads`.
    pub max_in_flight_jobs: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        let n = available_parallelism();
        Self {
            num_threads: Some(n),
            max_in_flight_jobs: n,
        }
    }
}

impl OrchestratorOptions {
    /// Check the options and resolve the worker thread count.
    fn worker_threads(&self) -> JobResult<usize> {
        if self.max_in_flight_jobs == 0 {
            return Err(JobError::InvalidConfig("max_in_flight_jobs must be > 0".to_string()));
        }
        match self.num_threads {
            Some(0) => Err(JobError::InvalidConfig("num_threads must be > 0 when set".to_string())),
            Some(n) => Ok(n),
            None => Ok(available_parallelism()),
        }
    }
}

fn available_parallelism() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// What a caller asks to run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub file_id: String,
    pub operation: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

impl JobRequest {
    pub fn new(file_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            operation: operation.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

struct QueuedJob {
    id: JobId,
    enqueued_at: Instant,
}

enum Claim {
    Run(ProcessingJob),
    /// Nothing to run. `settled` is set when the job is gone or terminal.
    Skip { settled: bool },
}

/// State shared between the caller-facing handle, the dispatcher and the workers.
struct Shared {
    source: Arc<dyn DatasetSource>,
    store: Arc<dyn JobStore>,
    generator: Arc<dyn TextGenerator>,
    observer: RwLock<Option<Arc<dyn JobObserver>>>,
    metrics: Arc<JobMetrics>,
    /// Single-writer guard per job that is not yet settled.
    guards: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
    /// Bumped on every job state change.
    changes: Mutex<u64>,
    changed: Condvar,
}

/// Drives jobs from submission to a terminal state.
///
/// Submission stores the job as `pending` and hands its id to a dispatcher thread, which runs it
/// on a worker pool. Dropping the orchestrator stops accepting work and waits for queued and
/// running jobs to finish.
pub struct Orchestrator {
    shared: Arc<Shared>,
    queue: Option<Sender<QueuedJob>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create an orchestrator and start its dispatcher.
    ///
    /// Fails with [`JobError::InvalidConfig`] if `max_in_flight_jobs == 0` or
    /// `num_threads == Some(0)`.
    pub fn new(
        source: Arc<dyn DatasetSource>,
        store: Arc<dyn JobStore>,
        generator: Arc<dyn TextGenerator>,
        opts: OrchestratorOptions,
    ) -> JobResult<Self> {
        let n_threads = opts.worker_threads()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("sheet-jobs-worker-{i}"))
            .panic_handler(|payload| {
                error!(panic = %panic_message(&*payload), "worker task panicked");
            })
            .build()
            .map_err(|e| JobError::InvalidConfig(e.to_string()))?;
        let permits = Arc::new(Semaphore::new(opts.max_in_flight_jobs));

        let shared = Arc::new(Shared {
            source,
            store,
            generator,
            observer: RwLock::new(None),
            metrics: Arc::new(JobMetrics::new()),
            guards: Mutex::new(HashMap::new()),
            changes: Mutex::new(0),
            changed: Condvar::new(),
        });

        let (tx, rx) = mpsc::channel();
        let dispatcher = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("sheet-jobs-dispatch".to_string())
                .spawn(move || dispatch_loop(shared, pool, permits, rx))
                .map_err(JobError::Spawn)?
        };
        debug!(n_threads, max_in_flight_jobs = opts.max_in_flight_jobs, "orchestrator started");

        Ok(Self {
            shared,
            queue: Some(tx),
            dispatcher: Some(dispatcher),
        })
    }

    /// Attach an observer for job events (metrics/logging).
    pub fn with_observer(self, observer: Arc<dyn JobObserver>) -> Self {
        *self.shared.observer.write().unwrap_or_else(PoisonError::into_inner) = Some(observer);
        self
    }

    /// Get a handle to real-time job metrics.
    pub fn metrics(&self) -> Arc<JobMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// The agents behind the supported operations.
    pub fn agent_catalog(&self) -> Vec<AgentInfo> {
        agent_catalog()
    }

    /// Validate the request, record it as `pending` and queue it for execution.
    ///
    /// Unknown operations and malformed parameters are rejected here and never stored.
    pub fn submit(&self, request: JobRequest) -> JobResult<ProcessingJob> {
        OperationRequest::parse(&request.operation, request.parameters.as_ref())?;

        let job = ProcessingJob::new(request.file_id, request.operation, request.parameters);
        self.shared.store.create_job(&job)?;
        self.shared.metrics.on_submitted();
        self.shared.emit(JobEvent::Submitted {
            id: job.id,
            operation: job.operation.clone(),
        });

        self.enqueue(job.id)?;
        Ok(job)
    }

    /// Cancel a `pending` job, moving it straight to `failed`.
    ///
    /// Best effort: a job that has already been dispatched is left alone and reaches its natural
    /// terminal state. Returns the job as it stands after the request.
    pub fn cancel(&self, id: JobId) -> JobResult<ProcessingJob> {
        let shared = &self.shared;
        let guard = shared.guard(id);
        let outcome = {
            let _held = lock(&guard);
            shared.cancel_pending(id)
        };

        let settled = match &outcome {
            Ok((job, _)) => job.is_terminal(),
            Err(JobError::NotFound(_)) => true,
            Err(_) => false,
        };
        if settled {
            shared.release_guard(id);
        }

        let (job, cancelled) = outcome?;
        if cancelled {
            shared.metrics.on_cancelled();
            shared.emit(JobEvent::Cancelled { id });
            shared.notify_changed();
        } else {
            shared.emit(JobEvent::CancelIgnored { id, status: job.status });
        }
        Ok(job)
    }

    pub fn job(&self, id: JobId) -> JobResult<ProcessingJob> {
        self.shared.job(id)
    }

    /// All jobs, oldest first.
    pub fn jobs(&self) -> JobResult<Vec<ProcessingJob>> {
        Ok(self.shared.store.list_jobs()?)
    }

    /// The audit trail of a job, in order.
    pub fn logs(&self, id: JobId) -> JobResult<Vec<AgentLogEntry>> {
        self.shared.job(id)?;
        Ok(self.shared.store.logs_for_job(id)?)
    }

    pub fn job_details(&self, id: JobId) -> JobResult<JobDetails> {
        let job = self.shared.job(id)?;
        let logs = self.shared.store.logs_for_job(id)?;
        Ok(JobDetails { job, logs })
    }

    /// Queue every job the store holds in `pending` state. Returns how many were queued.
    pub fn resume_pending(&self) -> JobResult<usize> {
        let pending: Vec<JobId> = self
            .shared
            .store
            .list_jobs()?
            .into_iter()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| job.id)
            .collect();
        for id in &pending {
            self.enqueue(*id)?;
        }
        debug!(count = pending.len(), "resumed pending jobs");
        Ok(pending.len())
    }

    /// Block until the job is `completed` or `failed`.
    pub fn wait_for_terminal(&self, id: JobId, timeout: Duration) -> JobResult<ProcessingJob> {
        self.wait_until(id, timeout, |job| Ok(job.is_terminal()))
    }

    /// Block until the job reaches `status`.
    ///
    /// Fails with [`JobError::InvalidTransition`] once the job settles in a different terminal
    /// state, since `status` can then never be reached.
    pub fn wait_for_status(
        &self,
        id: JobId,
        status: JobStatus,
        timeout: Duration,
    ) -> JobResult<ProcessingJob> {
        self.wait_until(id, timeout, |job| {
            if job.status == status {
                Ok(true)
            } else if job.is_terminal() {
                Err(JobError::InvalidTransition {
                    from: job.status,
                    to: status,
                })
            } else {
                Ok(false)
            }
        })
    }

    fn wait_until<F>(&self, id: JobId, timeout: Duration, done: F) -> JobResult<ProcessingJob>
    where
        F: Fn(&ProcessingJob) -> JobResult<bool>,
    {
        let deadline = Instant::now().checked_add(timeout);
        let mut changes = lock(&self.shared.changes);
        loop {
            // Reading under `changes` means no state change can slip in before the wait.
            let job = self.shared.job(id)?;
            if done(&job)? {
                return Ok(job);
            }
            changes = match deadline {
                None => self.shared.changed.wait(changes).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(JobError::WaitTimeout { id, timeout });
                    }
                    self.shared
                        .changed
                        .wait_timeout(changes, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn enqueue(&self, id: JobId) -> JobResult<()> {
        let queue = self.queue.as_ref().ok_or(JobError::ShuttingDown)?;
        queue
            .send(QueuedJob {
                id,
                enqueued_at: Instant::now(),
            })
            .map_err(|_| JobError::ShuttingDown)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        drop(self.queue.take());
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                error!("dispatcher thread panicked");
            }
        }
    }
}

fn dispatch_loop(
    shared: Arc<Shared>,
    pool: ThreadPool,
    permits: Arc<Semaphore>,
    queue: Receiver<QueuedJob>,
) {
    for queued in queue {
        let (permit, waited) = permits.acquire_owned();
        if waited > Duration::ZERO {
            shared.metrics.on_throttle_wait(waited);
            shared.emit(JobEvent::ThrottleWaited { duration: waited });
        }

        let shared = Arc::clone(&shared);
        pool.spawn(move || {
            let _permit = permit;
            let id = queued.id;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| shared.run(queued))) {
                error!(job = %id, panic = %panic_message(&*payload), "job bookkeeping panicked");
                shared.notify_changed();
            }
        });
    }
    permits.wait_idle();
    debug!("dispatcher stopped");
}

impl Shared {
    fn run(&self, queued: QueuedJob) {
        let id = queued.id;
        let guard = self.guard(id);
        let claimed = {
            let _held = lock(&guard);
            self.claim(id)
        };

        let job = match claimed {
            Ok(Claim::Run(job)) => job,
            Ok(Claim::Skip { settled }) => {
                if settled {
                    self.release_guard(id);
                }
                return;
            }
            Err(e) => {
                // Left `pending`; `resume_pending` can pick it up again.
                error!(job = %id, error = %e, "could not claim job");
                return;
            }
        };

        let agent = Operation::agent_name_for(&job.operation);
        let queue_wait = queued.enqueued_at.elapsed();
        self.metrics.on_started(queue_wait);
        self.emit(JobEvent::Started { id, agent, queue_wait });
        self.notify_changed();

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.perform(&job)))
            .unwrap_or_else(|payload| Err(JobError::OperationPanicked(panic_message(&*payload))));

        let settled = {
            let _held = lock(&guard);
            self.settle(&job, agent, outcome)
        };
        self.release_guard(id);

        match settled {
            Ok(job) => {
                let elapsed = started.elapsed();
                let succeeded = job.status == JobStatus::Completed;
                self.metrics.on_finished(succeeded);
                if succeeded {
                    self.emit(JobEvent::Completed { id, elapsed });
                } else {
                    self.emit(JobEvent::Failed {
                        id,
                        reason: job.error.unwrap_or_default(),
                        elapsed,
                    });
                }
            }
            Err(e) => {
                // The store rejected both outcomes; the record stays `processing`.
                self.metrics.on_abandoned();
                error!(job = %id, error = %e, "could not record job outcome");
            }
        }
        self.notify_changed();
    }

    /// `pending` → `processing`, recording the `start` entry first.
    fn claim(&self, id: JobId) -> JobResult<Claim> {
        let Some(job) = self.store.job(id)? else {
            warn!(job = %id, "queued job is missing from the store");
            return Ok(Claim::Skip { settled: true });
        };
        if job.status != JobStatus::Pending {
            debug!(job = %id, status = %job.status, "skipping job that is no longer pending");
            return Ok(Claim::Skip {
                settled: job.is_terminal(),
            });
        }

        let agent = Operation::agent_name_for(&job.operation);
        let input = json!({ "operation": job.operation, "parameters": job.parameters });
        self.store.append_log(NewAgentLogEntry::start(id, agent, input))?;

        let mut next = job;
        next.transition(JobStatus::Processing)?;
        self.store.update_job(&next)?;
        Ok(Claim::Run(next))
    }

    /// Resolve, fetch, decode and run. Every failure surfaces as an `Err`.
    fn perform(&self, job: &ProcessingJob) -> JobResult<serde_json::Value> {
        let request = OperationRequest::parse(&job.operation, job.parameters.as_ref())?;
        let bytes = self.source.fetch(&job.file_id)?;
        let dataset = decode_dataset(&bytes)?;
        debug!(
            job = %job.id,
            operation = %request.operation(),
            sheets = dataset.metadata().total_sheets,
            rows = dataset.metadata().total_rows,
            "dataset decoded"
        );
        request.run(&dataset, self.generator.as_ref())
    }

    /// Record the outcome: log entry first, then the job record.
    fn settle(
        &self,
        job: &ProcessingJob,
        agent: &str,
        outcome: JobResult<serde_json::Value>,
    ) -> JobResult<ProcessingJob> {
        match outcome {
            Ok(result) => match self.record_success(job, agent, result) {
                Ok(done) => Ok(done),
                Err(e) => {
                    warn!(job = %job.id, error = %e, "recording success failed, failing job");
                    self.record_failure(job, &e)
                }
            },
            Err(e) => self.record_failure(job, &e),
        }
    }

    fn record_success(
        &self,
        job: &ProcessingJob,
        agent: &str,
        result: serde_json::Value,
    ) -> JobResult<ProcessingJob> {
        self.store
            .append_log(NewAgentLogEntry::complete(job.id, agent, result.clone()))?;
        let mut next = job.clone();
        next.complete(result)?;
        self.store.update_job(&next)?;
        Ok(next)
    }

    fn record_failure(&self, job: &ProcessingJob, cause: &JobError) -> JobResult<ProcessingJob> {
        let reason = cause.to_string();
        self.store.append_log(NewAgentLogEntry::error(job.id, &reason))?;
        let mut next = job.clone();
        next.fail(reason)?;
        self.store.update_job(&next)?;
        Ok(next)
    }

    /// Returns the job after the request and whether this call cancelled it.
    fn cancel_pending(&self, id: JobId) -> JobResult<(ProcessingJob, bool)> {
        let job = self.job(id)?;
        if job.status != JobStatus::Pending {
            return Ok((job, false));
        }
        let mut cancelled = job;
        cancelled.fail(CANCELLED_REASON)?;
        self.store.update_job(&cancelled)?;
        Ok((cancelled, true))
    }

    fn job(&self, id: JobId) -> JobResult<ProcessingJob> {
        self.store.job(id)?.ok_or(JobError::NotFound(id))
    }

    fn guard(&self, id: JobId) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.guards).entry(id).or_default())
    }

    /// Only called once the job can no longer change state.
    fn release_guard(&self, id: JobId) {
        lock(&self.guards).remove(&id);
    }

    fn notify_changed(&self) {
        let mut changes = lock(&self.changes);
        *changes = changes.wrapping_add(1);
        self.changed.notify_all();
    }

    fn emit(&self, event: JobEvent) {
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(obs) = observer {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| obs.on_event(&event))) {
                error!(panic = %panic_message(&*payload), "job observer panicked");
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
