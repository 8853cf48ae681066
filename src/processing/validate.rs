//! Schema validation for a [`crate::types::Sheet`].
//!
//! Validation never stops early: every covered column of every row is checked and every problem
//! is reported as a [`ValidationError`] value (not a Rust error).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{Cell, Sheet};

/// Offset from a 0-based data row index to the 1-based sheet row shown to users
/// (+1 for the header row, +1 for 1-based display).
pub const DISPLAY_ROW_OFFSET: usize = 2;

static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

/// Declared value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Any value; no type check.
    String,
    /// Must parse as a numeric literal.
    Number,
    /// Must look like `local@domain.tld`.
    Email,
    /// Accepted as-is; no type check.
    Date,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawColumnSchema {
    #[serde(default)]
    required: bool,
    #[serde(default, rename = "type")]
    column_type: Option<ColumnType>,
    #[serde(default)]
    pattern: Option<String>,
}

/// Expectations for one column, index-aligned with the sheet's columns.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "RawColumnSchema")]
pub struct ColumnSchema {
    /// Absent or empty values are errors.
    pub required: bool,
    /// Optional type check for present values.
    pub column_type: Option<ColumnType>,
    /// Optional regular expression that present values must match.
    pub pattern: Option<Regex>,
}

impl ColumnSchema {
    pub fn new(required: bool, column_type: Option<ColumnType>) -> Self {
        Self {
            required,
            column_type,
            pattern: None,
        }
    }

    /// Require present values to match `pattern`.
    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

impl TryFrom<RawColumnSchema> for ColumnSchema {
    type Error = regex::Error;

    fn try_from(raw: RawColumnSchema) -> Result<Self, Self::Error> {
        let pattern = raw.pattern.as_deref().map(Regex::new).transpose()?;
        Ok(Self {
            required: raw.required,
            column_type: raw.column_type,
            pattern,
        })
    }
}

/// Ordered column expectations. Columns beyond the schema are not checked.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationSchema {
    pub columns: Vec<ColumnSchema>,
}

impl ValidationSchema {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }
}

/// One problem found in the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Sheet row number (data index + [`DISPLAY_ROW_OFFSET`]).
    pub row: usize,
    /// 0-based column index.
    pub column: usize,
    pub message: String,
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// `true` exactly when `errors` is empty.
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
}

/// Check every row of `sheet` against `schema`.
pub fn validate(sheet: &Sheet, schema: &ValidationSchema) -> ValidationResult {
    let mut errors = Vec::new();
    let mut valid_rows = 0usize;

    for row_idx in 0..sheet.row_count() {
        let before = errors.len();
        for (col_idx, col) in schema.columns.iter().enumerate() {
            check_cell(
                sheet.cell(row_idx, col_idx),
                col,
                row_idx + DISPLAY_ROW_OFFSET,
                col_idx,
                &mut errors,
            );
        }
        if errors.len() == before {
            valid_rows += 1;
        }
    }

    let total_rows = sheet.row_count();
    ValidationResult {
        valid: errors.is_empty(),
        errors,
        total_rows,
        valid_rows,
        invalid_rows: total_rows - valid_rows,
    }
}

fn check_cell(
    cell: &Cell,
    col: &ColumnSchema,
    row: usize,
    column: usize,
    errors: &mut Vec<ValidationError>,
) {
    let mut push = |message: String| {
        errors.push(ValidationError {
            row,
            column,
            message,
        })
    };

    if cell.is_blank() {
        if col.required {
            push(format!("Column {} is required", column + 1));
        }
        return;
    }

    match col.column_type {
        Some(ColumnType::Number) if !is_numeric(cell) => {
            push(format!("Column {} must be a number", column + 1));
        }
        Some(ColumnType::Email) if !is_email(&cell.to_text()) => {
            push(format!("Column {} must be a valid email", column + 1));
        }
        _ => {}
    }

    if let Some(pattern) = &col.pattern {
        if !pattern.is_match(&cell.to_text()) {
            push(format!("Column {} does not match pattern", column + 1));
        }
    }
}

/// Numbers and booleans are numeric. Text is numeric when, after trimming, it is empty, a decimal
/// literal, a signed `Infinity`, or an unsigned `0x`/`0o`/`0b` integer literal.
fn is_numeric(cell: &Cell) -> bool {
    match cell {
        Cell::Number(_) | Cell::Bool(_) => true,
        Cell::Text(s) => is_numeric_text(s.trim()),
        Cell::Empty => false,
    }
}

fn is_numeric_text(s: &str) -> bool {
    if s.is_empty() || matches!(s, "Infinity" | "+Infinity" | "-Infinity") {
        return true;
    }
    if let Some(valid) = radix_literal(s) {
        return valid;
    }
    // `f64::from_str` also takes `inf`/`nan` spellings, which are not numbers here.
    s.parse::<f64>().is_ok_and(f64::is_finite)
}

/// `Some(valid)` when `s` carries a radix prefix, `None` otherwise.
fn radix_literal(s: &str) -> Option<bool> {
    let prefix = s.get(..2)?.to_ascii_lowercase();
    let radix = match prefix.as_str() {
        "0x" => 16,
        "0o" => 8,
        "0b" => 2,
        _ => return None,
    };
    let digits = &s[2..];
    Some(!digits.is_empty() && digits.chars().all(|c| c.is_digit(radix)))
}

/// No whitespace, exactly one `@`, and a `.` inside the domain part.
pub fn is_email(value: &str) -> bool {
    EMAIL_SHAPE.is_match(value)
}
