//! `sheet-jobs` decodes spreadsheets into an in-memory [`types::Dataset`] and runs one of four
//! operations over it (analyze, transform, validate, extract) as a tracked job with an
//! append-only audit trail.
//!
//! The primary entrypoint is [`execution::Orchestrator`]: submit a [`execution::JobRequest`],
//! then poll or wait for the job to reach `completed` or `failed`.
//!
//! ## What you can decode
//!
//! **Formats (sniffed from the bytes, not a file extension):**
//!
//! - **Workbooks**: `.xlsx`/`.xlsm`/`.xlsb`/`.ods` (zip containers) and legacy `.xls` (OLE)
//! - **Delimited text**: UTF-8 CSV, decoded as a single sheet named `Sheet1`
//!
//! The first row of every sheet becomes its headers. Cells are untyped [`types::Cell`] values:
//! text, number, boolean or absent. Workbook dates decode to ISO-8601 text.
//!
//! ## Operations
//!
//! | Selector | Agent | Result |
//! |---|---|---|
//! | `analyze` | `DataAnalyzer` | structural statistics plus a generated summary |
//! | `transform` | `DataTransformer` | the sheet rebuilt by ordered per-column rules |
//! | `validate` | `DataValidator` | per-row errors against a column schema |
//! | `extract` | `DataExtractor` | regex / substring matches, at most 10 reported per pattern |
//!
//! Every operation has documented default parameters, so a job can be submitted without any.
//!
//! ## Quick example: run a job
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sheet_jobs::execution::{
//!     InMemoryJobStore, InMemorySource, JobRequest, LogAction, Orchestrator, OrchestratorOptions,
//! };
//! use sheet_jobs::processing::HeuristicNarrator;
//!
//! # fn main() -> Result<(), sheet_jobs::JobError> {
//! let source = Arc::new(InMemorySource::new());
//! source.insert("contacts.csv", "Name,Email\nAnn,ann@example.com\n,\n");
//!
//! let orchestrator = Orchestrator::new(
//!     source,
//!     Arc::new(InMemoryJobStore::new()),
//!     Arc::new(HeuristicNarrator),
//!     OrchestratorOptions::default(),
//! )?;
//!
//! let params = serde_json::json!({
//!     "schema": { "columns": [{ "required": true }, { "required": true, "type": "email" }] }
//! });
//! let request = JobRequest::new("contacts.csv", "validate").with_parameters(params);
//! let job = orchestrator.submit(request)?;
//! let job = orchestrator.wait_for_terminal(job.id, Duration::from_secs(10))?;
//!
//! let result = job.result.unwrap();
//! assert_eq!(result["validRows"], 1);
//! assert_eq!(result["invalidRows"], 1);
//!
//! let actions: Vec<LogAction> = orchestrator.logs(job.id)?.iter().map(|e| e.action).collect();
//! assert_eq!(actions, vec![LogAction::Start, LogAction::Complete]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: format sniffing and workbook / delimited text decoding
//! - [`types`]: the tabular data model
//! - [`processing`]: the four operations and their typed parameters
//! - [`execution`]: the job orchestrator, job store and dataset source boundaries
//! - [`error`]: error types used across the crate

pub mod error;
pub mod execution;
pub mod ingestion;
#[cfg(feature = "cli")]
pub mod logging;
pub mod processing;
pub mod types;

pub use error::{
    DecodeError, DecodeResult, GenerationError, JobError, JobResult, SourceError, StoreError,
};
