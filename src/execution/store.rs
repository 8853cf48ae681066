//! Durable record of jobs and their audit trail.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::StoreError;

use super::job::{AgentLogEntry, JobId, NewAgentLogEntry, ProcessingJob};

/// Storage boundary for [`ProcessingJob`] records and [`AgentLogEntry`] trails.
///
/// Implementations must be safe to share between the submission path and the executing workers.
/// Log entries are append-only: nothing in this trait mutates or removes one.
pub trait JobStore: Send + Sync {
    /// Insert a new job record.
    fn create_job(&self, job: &ProcessingJob) -> Result<(), StoreError>;

    fn job(&self, id: JobId) -> Result<Option<ProcessingJob>, StoreError>;

    /// Replace an existing job record.
    fn update_job(&self, job: &ProcessingJob) -> Result<(), StoreError>;

    /// Every job, oldest first.
    fn list_jobs(&self) -> Result<Vec<ProcessingJob>, StoreError>;

    /// Record an entry, assigning its id and timestamp.
    fn append_log(&self, entry: NewAgentLogEntry) -> Result<AgentLogEntry, StoreError>;

    /// Entries for one job, ordered by time.
    fn logs_for_job(&self, id: JobId) -> Result<Vec<AgentLogEntry>, StoreError>;
}

#[derive(Default)]
struct Records {
    jobs: HashMap<JobId, ProcessingJob>,
    order: Vec<JobId>,
    logs: Vec<AgentLogEntry>,
    next_log_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// A [`JobStore`] held in process memory.
#[derive(Default)]
pub struct InMemoryJobStore {
    records: Mutex<Records>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobStore for InMemoryJobStore {
    fn create_job(&self, job: &ProcessingJob) -> Result<(), StoreError> {
        let mut records = self.records();
        if records.jobs.contains_key(&job.id) {
            return Err(StoreError::Backend(format!("job {} already exists", job.id)));
        }
        records.order.push(job.id);
        records.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn job(&self, id: JobId) -> Result<Option<ProcessingJob>, StoreError> {
        Ok(self.records().jobs.get(&id).cloned())
    }

    fn update_job(&self, job: &ProcessingJob) -> Result<(), StoreError> {
        let mut records = self.records();
        let slot = records.jobs.get_mut(&job.id).ok_or(StoreError::JobNotFound(job.id))?;
        *slot = job.clone();
        Ok(())
    }

    fn list_jobs(&self) -> Result<Vec<ProcessingJob>, StoreError> {
        let records = self.records();
        let mut jobs: Vec<ProcessingJob> = records
            .order
            .iter()
            .filter_map(|id| records.jobs.get(id).cloned())
            .collect();
        // Stable: equal timestamps keep insertion order.
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    fn append_log(&self, entry: NewAgentLogEntry) -> Result<AgentLogEntry, StoreError> {
        let mut records = self.records();
        if !records.jobs.contains_key(&entry.job_id) {
            return Err(StoreError::JobNotFound(entry.job_id));
        }

        // Wall clock can step backwards; keep timestamps non-decreasing in append order.
        let now = Utc::now();
        let timestamp = records.last_timestamp.map_or(now, |last| last.max(now));
        records.last_timestamp = Some(timestamp);
        records.next_log_id += 1;

        let stored = AgentLogEntry {
            id: records.next_log_id,
            job_id: entry.job_id,
            agent_name: entry.agent_name,
            action: entry.action,
            input: entry.input,
            output: entry.output,
            timestamp,
        };
        records.logs.push(stored.clone());
        Ok(stored)
    }

    fn logs_for_job(&self, id: JobId) -> Result<Vec<AgentLogEntry>, StoreError> {
        let records = self.records();
        let mut logs: Vec<AgentLogEntry> = records
            .logs
            .iter()
            .filter(|e| e.job_id == id)
            .cloned()
            .collect();
        logs.sort_by_key(|e| (e.timestamp, e.id));
        Ok(logs)
    }
}
