//! Spreadsheet decoding.
//!
//! Most callers should use [`decode_dataset`] (from [`unified`]) which:
//!
//! - sniffs the container format from the leading bytes
//! - decodes every sheet into an in-memory [`crate::types::Dataset`]
//!
//! Format-specific functions are also available under:
//! - [`excel`]
//! - [`csv`]

pub mod csv;
pub mod excel;
pub mod unified;

pub use unified::{decode_dataset, SpreadsheetFormat};
