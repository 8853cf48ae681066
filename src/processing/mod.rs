//! The operation engine.
//!
//! The processing layer operates on [`crate::types::Sheet`] and [`crate::types::Dataset`] values
//! produced by decoding. Every function here is pure: no I/O, no shared state, safe to call
//! concurrently for different jobs.
//!
//! Currently implemented:
//!
//! - [`transform()`]: ordered per-column rewrite rules
//! - [`validate()`]: per-column required/type/pattern checks
//! - [`extract()`]: regex and substring search over every cell
//! - [`analyze()`]: structural statistics plus a generated narrative
//!
//! [`OperationRequest`] ties a selector and its typed parameters together.
//!
//! ## Example: transform → validate → extract
//!
//! ```rust
//! use sheet_jobs::processing::{
//!     extract, transform, validate, ColumnSchema, ColumnType, ExtractPattern, TransformRule,
//!     ValidationSchema,
//! };
//! use sheet_jobs::types::{Cell, Sheet};
//!
//! let sheet = Sheet::new(
//!     "Contacts",
//!     vec!["Name".to_string(), "Email".to_string()],
//!     vec![
//!         vec![Cell::from("  ann "), Cell::from("ann@example.com")],
//!         vec![Cell::from("bo"), Cell::from("not-an-email")],
//!     ],
//! );
//!
//! let cleaned = transform(&sheet, &[TransformRule::Trim { column: 0 }]);
//! assert_eq!(cleaned.rows[0][0], Cell::from("ann"));
//!
//! let schema = ValidationSchema::new(vec![
//!     ColumnSchema::new(true, Some(ColumnType::String)),
//!     ColumnSchema::new(true, Some(ColumnType::Email)),
//! ]);
//! let report = validate(&cleaned, &schema);
//! assert_eq!((report.valid_rows, report.invalid_rows), (1, 1));
//!
//! let emails = ExtractPattern::regex("Emails", r"\S+@\S+\.\w+").unwrap();
//! let found = extract(&cleaned, &[emails]);
//! assert_eq!(found[0].match_count, 1);
//! ```

pub mod analyze;
pub mod extract;
pub mod operation;
pub mod transform;
pub mod validate;

pub use analyze::{
    analyze, dataset_statistics, AnalysisReport, ColumnKind, DatasetStatistics, GenerationRequest,
    HeuristicNarrator, Narrative, TextGenerator, TypeHistogram,
};
pub use extract::{
    extract, ExtractMatch, ExtractPattern, ExtractResult, PatternKind, MAX_REPORTED_MATCHES,
};
pub use operation::{
    agent_catalog, AgentInfo, AnalyzeParams, ExtractParams, Operation, OperationRequest,
    TransformParams, ValidateParams,
};
pub use transform::{transform, TransformRule};
pub use validate::{
    validate, ColumnSchema, ColumnType, ValidationError, ValidationResult, ValidationSchema,
};
