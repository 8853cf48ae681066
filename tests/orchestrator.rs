use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use sheet_jobs::error::{GenerationError, SourceError, StoreError};
use sheet_jobs::execution::{
    AgentLogEntry, DatasetSource, InMemoryJobStore, InMemorySource, JobEvent, JobObserver,
    JobRequest, JobStatus, JobStore, LogAction, NewAgentLogEntry, Orchestrator,
    OrchestratorOptions, ProcessingJob, CANCELLED_REASON,
};
use sheet_jobs::processing::{GenerationRequest, HeuristicNarrator, Narrative, TextGenerator};
use sheet_jobs::JobError;

const TIMEOUT: Duration = Duration::from_secs(10);
const PEOPLE: &str = "Name,Email,Age\nAnn,ann@example.com,31\nBo,not-an-email,x\n";

fn people_source() -> Arc<InMemorySource> {
    let source = Arc::new(InMemorySource::new());
    source.insert("people.csv", PEOPLE);
    source.insert("broken.xlsx", b"PK\x03\x04 truncated".to_vec());
    source
}

fn orchestrator_with(
    source: Arc<dyn DatasetSource>,
    store: Arc<InMemoryJobStore>,
    generator: Arc<dyn TextGenerator>,
    max_in_flight_jobs: usize,
) -> Orchestrator {
    Orchestrator::new(
        source,
        store,
        generator,
        OrchestratorOptions {
            num_threads: Some(2),
            max_in_flight_jobs,
        },
    )
    .unwrap()
}

fn orchestrator() -> Orchestrator {
    orchestrator_with(
        people_source(),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(HeuristicNarrator),
        2,
    )
}

fn actions(orch: &Orchestrator, id: Uuid) -> Vec<LogAction> {
    orch.logs(id).unwrap().iter().map(|e| e.action).collect()
}

/// A source whose fetches block until the gate opens.
struct GatedSource {
    inner: Arc<InMemorySource>,
    open: Mutex<bool>,
    cv: Condvar,
}

impl GatedSource {
    fn new(inner: Arc<InMemorySource>) -> Self {
        Self {
            inner,
            open: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

impl DatasetSource for GatedSource {
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>, SourceError> {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
        drop(open);
        self.inner.fetch(file_id)
    }
}

/// Opens the gate when dropped, so a failing test never leaves the orchestrator blocked.
struct OpenOnDrop(Arc<GatedSource>);

impl Drop for OpenOnDrop {
    fn drop(&mut self) {
        self.0.open();
    }
}

struct Unreachable;

impl TextGenerator for Unreachable {
    fn generate(&self, _request: &GenerationRequest) -> Result<Narrative, GenerationError> {
        Err(GenerationError::Unavailable("connection refused".to_string()))
    }
}

struct Exploding;

impl TextGenerator for Exploding {
    fn generate(&self, _request: &GenerationRequest) -> Result<Narrative, GenerationError> {
        panic!("generator exploded");
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl JobObserver for EventLog {
    fn on_event(&self, event: &JobEvent) {
        let name = match event {
            JobEvent::Submitted { .. } => "submitted",
            JobEvent::ThrottleWaited { .. } => return,
            JobEvent::Started { .. } => "started",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Failed { .. } => "failed",
            JobEvent::Cancelled { .. } => "cancelled",
            JobEvent::CancelIgnored { .. } => "cancel-ignored",
        };
        self.0.lock().unwrap().push(name.to_string());
    }
}

#[test]
fn completed_job_carries_result_and_ordered_audit_trail() {
    let orch = orchestrator();
    let submitted = orch.submit(JobRequest::new("people.csv", "validate")).unwrap();
    assert_eq!(submitted.status, JobStatus::Pending);

    let job = orch.wait_for_terminal(submitted.id, TIMEOUT).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.error, None);
    let result = job.result.clone().unwrap();
    assert_eq!(result["totalRows"], 2);
    assert_eq!(result["validRows"], 1);

    let details = orch.job_details(job.id).unwrap();
    assert_eq!(details.logs.len(), 2);
    let (start, complete) = (&details.logs[0], &details.logs[1]);
    assert_eq!(start.action, LogAction::Start);
    assert_eq!(start.agent_name, "DataValidator");
    assert_eq!(start.input, Some(json!({ "operation": "validate", "parameters": null })));
    assert_eq!(complete.action, LogAction::Complete);
    assert_eq!(complete.agent_name, "DataValidator");
    assert_eq!(complete.output, Some(result));
    assert!(start.timestamp <= complete.timestamp);
    assert!(start.id < complete.id);

    let listed: Vec<Uuid> = orch.jobs().unwrap().iter().map(|j| j.id).collect();
    assert_eq!(listed, vec![job.id]);
}

#[test]
fn unknown_operations_are_rejected_before_they_are_stored() {
    let store = Arc::new(InMemoryJobStore::new());
    let orch = orchestrator_with(people_source(), store.clone(), Arc::new(HeuristicNarrator), 1);

    let err = orch.submit(JobRequest::new("people.csv", "summarize")).unwrap_err();
    assert!(matches!(err, JobError::UnsupportedOperation(ref op) if op == "summarize"));

    let bad_rules = JobRequest::new("people.csv", "transform")
        .with_parameters(json!({ "rules": "trim" }));
    let err = orch.submit(bad_rules).unwrap_err();
    assert!(matches!(err, JobError::InvalidParameters { .. }));

    assert!(store.list_jobs().unwrap().is_empty());
}

#[test]
fn unknown_operation_reaching_dispatch_fails_the_job() {
    let store = Arc::new(InMemoryJobStore::new());
    let orphan = ProcessingJob::new("people.csv", "summarize", None);
    store.create_job(&orphan).unwrap();

    let orch = orchestrator_with(people_source(), store, Arc::new(HeuristicNarrator), 1);
    assert_eq!(orch.resume_pending().unwrap(), 1);

    let job = orch.wait_for_terminal(orphan.id, TIMEOUT).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("Unknown operation: summarize"));

    let logs = orch.logs(orphan.id).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].agent_name, "GenericAgent");
    assert_eq!(logs[1].action, LogAction::Error);
    assert_eq!(logs[1].agent_name, "system");
    assert_eq!(logs[1].output, Some(json!({ "error": "Unknown operation: summarize" })));
}

#[test]
fn every_failure_kind_ends_in_failed_with_its_message() {
    let store = Arc::new(InMemoryJobStore::new());
    let orch = orchestrator_with(people_source(), store.clone(), Arc::new(Unreachable), 2);

    let missing = orch.submit(JobRequest::new("missing.csv", "extract")).unwrap();
    let broken = orch.submit(JobRequest::new("broken.xlsx", "extract")).unwrap();
    let no_model = orch.submit(JobRequest::new("people.csv", "analyze")).unwrap();
    let archive = JobRequest::new("people.csv", "validate")
        .with_parameters(json!({ "sheet": "Archive" }));
    let no_sheet = orch.submit(archive).unwrap();

    let reason = |id| orch.wait_for_terminal(id, TIMEOUT).unwrap().error.unwrap();
    assert_eq!(reason(missing.id), "file not found: missing.csv");
    assert!(reason(broken.id).starts_with("malformed workbook"));
    assert_eq!(reason(no_model.id), "text generation unavailable: connection refused");
    assert_eq!(reason(no_sheet.id), "Sheet 'Archive' not found");

    for job in store.list_jobs().unwrap() {
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.result, None);
        assert_eq!(actions(&orch, job.id), vec![LogAction::Start, LogAction::Error]);
    }
}

#[test]
fn panicking_operation_is_contained_at_dispatch() {
    let orch = orchestrator_with(
        people_source(),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(Exploding),
        1,
    );
    let first = orch.submit(JobRequest::new("people.csv", "analyze")).unwrap();
    let job = orch.wait_for_terminal(first.id, TIMEOUT).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("operation panicked: generator exploded"));

    // The worker survives and keeps executing jobs.
    let second = orch.submit(JobRequest::new("people.csv", "extract")).unwrap();
    let job = orch.wait_for_terminal(second.id, TIMEOUT).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[test]
fn cancel_fails_pending_jobs_and_leaves_running_ones_alone() {
    let gate = Arc::new(GatedSource::new(people_source()));
    let events = Arc::new(EventLog::default());
    let orch = orchestrator_with(
        gate.clone(),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(HeuristicNarrator),
        1,
    )
    .with_observer(events.clone());
    let _release = OpenOnDrop(gate.clone());

    let running = orch.submit(JobRequest::new("people.csv", "extract")).unwrap();
    let queued = orch.submit(JobRequest::new("people.csv", "extract")).unwrap();
    orch.wait_for_status(running.id, JobStatus::Processing, TIMEOUT).unwrap();

    // `queued` cannot start while `running` holds the only in-flight slot.
    let cancelled = orch.cancel(queued.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error.as_deref(), Some(CANCELLED_REASON));

    let untouched = orch.cancel(running.id).unwrap();
    assert_eq!(untouched.status, JobStatus::Processing);

    gate.open();
    let finished = orch.wait_for_terminal(running.id, TIMEOUT).unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(actions(&orch, running.id), vec![LogAction::Start, LogAction::Complete]);

    // Cancelling again changes nothing.
    let again = orch.cancel(queued.id).unwrap();
    assert_eq!(again.error.as_deref(), Some(CANCELLED_REASON));

    let metrics = orch.metrics();
    drop(orch);
    let snap = metrics.snapshot();
    assert_eq!((snap.started, snap.completed, snap.cancelled), (1, 1, 1));

    let seen = events.0.lock().unwrap().clone();
    assert!(seen.contains(&"cancelled".to_string()));
    assert!(seen.contains(&"cancel-ignored".to_string()));
    assert_eq!(seen.iter().filter(|e| *e == "started").count(), 1);
}

#[test]
fn cancelled_jobs_are_never_executed() {
    let store = Arc::new(InMemoryJobStore::new());
    let gate = Arc::new(GatedSource::new(people_source()));
    let orch = orchestrator_with(gate.clone(), store.clone(), Arc::new(HeuristicNarrator), 1);
    let _release = OpenOnDrop(gate.clone());

    let blocker = orch.submit(JobRequest::new("people.csv", "extract")).unwrap();
    orch.wait_for_status(blocker.id, JobStatus::Processing, TIMEOUT).unwrap();
    let victim = orch.submit(JobRequest::new("people.csv", "extract")).unwrap();
    orch.cancel(victim.id).unwrap();

    gate.open();
    orch.wait_for_terminal(blocker.id, TIMEOUT).unwrap();
    drop(orch);

    let victim = store.job(victim.id).unwrap().unwrap();
    assert_eq!(victim.status, JobStatus::Failed);
    assert_eq!(victim.error.as_deref(), Some(CANCELLED_REASON));
    assert!(store.logs_for_job(victim.id).unwrap().is_empty());
}

#[test]
fn racing_cancel_and_dispatch_produce_exactly_one_outcome() {
    let orch = orchestrator_with(
        people_source(),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(HeuristicNarrator),
        4,
    );

    for _ in 0..50 {
        let job = orch.submit(JobRequest::new("people.csv", "transform")).unwrap();
        let after_cancel = orch.cancel(job.id).unwrap();
        let done = orch.wait_for_terminal(job.id, TIMEOUT).unwrap();
        let trail = actions(&orch, job.id);

        if done.error.as_deref() == Some(CANCELLED_REASON) {
            assert_eq!(after_cancel.status, JobStatus::Failed);
            assert!(trail.is_empty());
            assert_eq!(done.result, None);
        } else {
            assert_eq!(done.status, JobStatus::Completed);
            assert_eq!(trail, vec![LogAction::Start, LogAction::Complete]);
        }
    }
}

#[test]
fn waiting_respects_timeouts_and_unreachable_states() {
    let gate = Arc::new(GatedSource::new(people_source()));
    let orch = orchestrator_with(
        gate.clone(),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(HeuristicNarrator),
        1,
    );
    let _release = OpenOnDrop(gate.clone());

    let job = orch.submit(JobRequest::new("people.csv", "validate")).unwrap();
    let err = orch
        .wait_for_terminal(job.id, Duration::from_millis(50))
        .unwrap_err();
    assert!(matches!(err, JobError::WaitTimeout { id, .. } if id == job.id));

    gate.open();
    orch.wait_for_terminal(job.id, TIMEOUT).unwrap();
    let err = orch.wait_for_status(job.id, JobStatus::Failed, TIMEOUT).unwrap_err();
    assert!(matches!(
        err,
        JobError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Failed
        }
    ));
}

#[test]
fn unknown_job_ids_are_not_found() {
    let orch = orchestrator();
    let id = Uuid::new_v4();
    assert!(matches!(orch.job(id), Err(JobError::NotFound(x)) if x == id));
    assert!(matches!(orch.cancel(id), Err(JobError::NotFound(_))));
    assert!(matches!(orch.logs(id), Err(JobError::NotFound(_))));
    assert!(matches!(orch.wait_for_terminal(id, TIMEOUT), Err(JobError::NotFound(_))));
}

#[test]
fn observer_sees_the_lifecycle_in_order() {
    let events = Arc::new(EventLog::default());
    let orch = orchestrator().with_observer(events.clone());

    let job = orch.submit(JobRequest::new("people.csv", "analyze")).unwrap();
    orch.wait_for_terminal(job.id, TIMEOUT).unwrap();
    drop(orch);

    let seen = events.0.lock().unwrap().clone();
    assert_eq!(seen, vec!["submitted", "started", "completed"]);
}

struct PanicsOnStart;

impl JobObserver for PanicsOnStart {
    fn on_event(&self, event: &JobEvent) {
        if let JobEvent::Started { .. } = event {
            panic!("observer blew up");
        }
    }
}

#[test]
fn panicking_observer_does_not_take_jobs_down() {
    let orch = orchestrator_with(
        people_source(),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(HeuristicNarrator),
        1,
    )
    .with_observer(Arc::new(PanicsOnStart));

    for operation in ["validate", "extract"] {
        let job = orch.submit(JobRequest::new("people.csv", operation)).unwrap();
        let job = orch.wait_for_terminal(job.id, TIMEOUT).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}

/// Accepts everything except writes that settle a job.
struct RefusesOutcomes(InMemoryJobStore);

impl JobStore for RefusesOutcomes {
    fn create_job(&self, job: &ProcessingJob) -> Result<(), StoreError> {
        self.0.create_job(job)
    }

    fn job(&self, id: Uuid) -> Result<Option<ProcessingJob>, StoreError> {
        self.0.job(id)
    }

    fn update_job(&self, job: &ProcessingJob) -> Result<(), StoreError> {
        if job.is_terminal() {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.0.update_job(job)
    }

    fn list_jobs(&self) -> Result<Vec<ProcessingJob>, StoreError> {
        self.0.list_jobs()
    }

    fn append_log(&self, entry: NewAgentLogEntry) -> Result<AgentLogEntry, StoreError> {
        self.0.append_log(entry)
    }

    fn logs_for_job(&self, id: Uuid) -> Result<Vec<AgentLogEntry>, StoreError> {
        self.0.logs_for_job(id)
    }
}

#[test]
fn unrecordable_outcome_leaves_job_processing_and_frees_its_slot() {
    let store = Arc::new(RefusesOutcomes(InMemoryJobStore::new()));
    let orch = Orchestrator::new(
        people_source(),
        store.clone(),
        Arc::new(HeuristicNarrator),
        OrchestratorOptions {
            num_threads: Some(1),
            max_in_flight_jobs: 1,
        },
    )
    .unwrap();
    let metrics = orch.metrics();

    let job = orch.submit(JobRequest::new("people.csv", "validate")).unwrap();
    let err = orch.wait_for_terminal(job.id, Duration::from_millis(200)).unwrap_err();
    assert!(matches!(err, JobError::WaitTimeout { .. }));
    drop(orch);

    assert_eq!(store.job(job.id).unwrap().unwrap().status, JobStatus::Processing);
    let trail: Vec<LogAction> = store
        .logs_for_job(job.id)
        .unwrap()
        .iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(trail, vec![LogAction::Start, LogAction::Complete, LogAction::Error]);

    let snap = metrics.snapshot();
    assert_eq!((snap.started, snap.active), (1, 0));
    assert_eq!((snap.completed, snap.failed), (0, 0));
}
