//! Job records, the job lifecycle and audit log entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{JobError, JobResult};

/// Identity of a [`ProcessingJob`].
pub type JobId = Uuid;

/// Failure reason recorded when a pending job is cancelled.
pub const CANCELLED_REASON: &str = "Job cancelled by user";

/// Acting component recorded on `error` log entries.
pub const SYSTEM_AGENT: &str = "system";

/// Lifecycle state of a job.
///
/// ```text
/// pending ──dispatch──▶ processing ──ok──▶ completed
///    │                      └──────err──▶ failed
///    └──────────cancel────────────────────▶ failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// `completed` and `failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single requested run of an operation over a dataset.
///
/// Only the orchestrator changes a job's state; callers receive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub id: JobId,
    /// Identity of the source file, resolved through a [`super::DatasetSource`].
    pub file_id: String,
    /// Operation selector as submitted.
    pub operation: String,
    /// Operation-specific parameter bag as submitted.
    pub parameters: Option<serde_json::Value>,
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    /// Failure reason, set only in the `failed` state.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    /// A new job in the `pending` state.
    pub fn new(
        file_id: impl Into<String>,
        operation: impl Into<String>,
        parameters: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_id: file_id.into(),
            operation: operation.into(),
            parameters,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, refusing transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: JobStatus) -> JobResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `processing` → `completed` with `result`.
    pub fn complete(&mut self, result: serde_json::Value) -> JobResult<()> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// → `failed` with `reason`.
    pub fn fail(&mut self, reason: impl Into<String>) -> JobResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(reason.into());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Kind of step an [`AgentLogEntry`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Start,
    Complete,
    Error,
}

/// An audit entry before the store has assigned its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAgentLogEntry {
    pub job_id: JobId,
    pub agent_name: String,
    pub action: LogAction,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
}

impl NewAgentLogEntry {
    pub fn start(job_id: JobId, agent_name: &str, input: serde_json::Value) -> Self {
        Self {
            job_id,
            agent_name: agent_name.to_string(),
            action: LogAction::Start,
            input: Some(input),
            output: None,
        }
    }

    pub fn complete(job_id: JobId, agent_name: &str, output: serde_json::Value) -> Self {
        Self {
            job_id,
            agent_name: agent_name.to_string(),
            action: LogAction::Complete,
            input: None,
            output: Some(output),
        }
    }

    /// Error entries are always attributed to [`SYSTEM_AGENT`].
    pub fn error(job_id: JobId, reason: &str) -> Self {
        Self {
            job_id,
            agent_name: SYSTEM_AGENT.to_string(),
            action: LogAction::Error,
            input: None,
            output: Some(serde_json::json!({ "error": reason })),
        }
    }
}

/// Immutable, append-only audit record of one step of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLogEntry {
    /// Store-assigned sequence number; increases with every append.
    pub id: u64,
    pub job_id: JobId,
    pub agent_name: String,
    pub action: LogAction,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// A job together with its ordered audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDetails {
    #[serde(flatten)]
    pub job: ProcessingJob,
    pub logs: Vec<AgentLogEntry>,
}
