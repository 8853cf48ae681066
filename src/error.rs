use std::time::Duration;

use thiserror::Error;

use crate::execution::{JobId, JobStatus};

/// Convenience result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Convenience result type for job submission and execution.
pub type JobResult<T> = Result<T, JobError>;

/// Error returned when raw bytes cannot be turned into a [`crate::types::Dataset`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Zero-length input.
    #[error("spreadsheet is empty (0 bytes)")]
    Empty,

    /// The bytes are neither a known workbook container nor UTF-8 delimited text.
    #[error("unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),

    /// Workbook container could not be read (corrupt zip/OLE, bad XML, etc.).
    #[error("malformed workbook: {0}")]
    Workbook(#[from] calamine::Error),

    /// Delimited text could not be read.
    #[error("malformed delimited text: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure reported by the external text-generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The generator could not be reached or refused the request.
    #[error("text generation unavailable: {0}")]
    Unavailable(String),

    /// The generator answered with something that does not fit the requested schema.
    #[error("text generation returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure fetching raw spreadsheet bytes from a [`crate::execution::DatasetSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a [`crate::execution::JobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} does not exist in the store")]
    JobNotFound(JobId),

    #[error("job store failure: {0}")]
    Backend(String),
}

/// Error type for job submission, orchestration and operation execution.
///
/// When a job fails, the `Display` text of the error becomes the job's failure reason verbatim.
#[derive(Debug, Error)]
pub enum JobError {
    /// The operation selector is not one of analyze/transform/validate/extract.
    #[error("Unknown operation: {0}")]
    UnsupportedOperation(String),

    /// The parameter bag does not fit the operation's parameter shape.
    #[error("invalid parameters for {operation}: {message}")]
    InvalidParameters { operation: String, message: String },

    /// Orchestrator options are unusable (zero threads, zero in-flight slots).
    #[error("invalid orchestrator configuration: {0}")]
    InvalidConfig(String),

    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("Workbook contains no sheets")]
    NoSheets,

    /// A state change that the job lifecycle does not allow.
    #[error("invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("timed out after {timeout:?} waiting for job {id}")]
    WaitTimeout { id: JobId, timeout: Duration },

    /// The orchestrator's queue is closed.
    #[error("orchestrator is shutting down")]
    ShuttingDown,

    #[error("failed to start dispatcher thread: {0}")]
    Spawn(std::io::Error),

    /// An operation panicked; caught at the dispatch boundary.
    #[error("operation panicked: {0}")]
    OperationPanicked(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to serialize operation output: {0}")]
    Serialization(#[from] serde_json::Error),
}
