//! Core tabular data model.
//!
//! Decoding produces a [`Dataset`]: an ordered list of [`Sheet`]s, each with string headers and
//! untyped [`Cell`] rows. Rows may be ragged (shorter than the header list); a missing cell reads
//! as [`Cell::Empty`].

use std::fmt;

use serde::ser::{Serialize, Serializer};

/// A single untyped spreadsheet value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    /// Missing/absent value.
    #[default]
    Empty,
    /// Numeric value (spreadsheets store every number as a float).
    Number(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 text.
    Text(String),
}

impl Cell {
    /// Convenience constructor for a text cell.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// `true` for [`Cell::Empty`] only.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// `true` for absent cells and for empty text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Text rendering of the value; absent cells render as the empty string.
    ///
    /// Numbers use the shortest round-trip form, so integral values print without a fraction
    /// (`3.0` renders as `"3"`).
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

// Cells serialize as plain JSON scalars (`null`, number, bool, string).
impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_none(),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

/// One tab of a spreadsheet: a header row plus data rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sheet {
    /// Sheet name, unique within its [`Dataset`].
    pub name: String,
    /// Column labels, one per column.
    pub headers: Vec<String>,
    /// Row-major cell storage. Rows may hold fewer cells than there are headers.
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// Create a sheet from its parts.
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Number of data rows (the header row is not counted).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of header columns.
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Cell at `(row, column)`; positions beyond a ragged row read as [`Cell::Empty`].
    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// Aggregate figures computed once at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatasetMetadata {
    /// Number of sheets.
    pub total_sheets: usize,
    /// Sum of per-sheet data row counts.
    pub total_rows: usize,
    /// Widest header count across sheets (a maximum, not a sum).
    pub total_columns: usize,
    /// Size in bytes of the source the dataset was decoded from.
    pub source_bytes: usize,
}

/// A decoded spreadsheet. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    sheets: Vec<Sheet>,
    metadata: DatasetMetadata,
}

impl Dataset {
    /// Build a dataset and compute its aggregates.
    pub fn new(sheets: Vec<Sheet>, source_bytes: usize) -> Self {
        let metadata = DatasetMetadata {
            total_sheets: sheets.len(),
            total_rows: sheets.iter().map(Sheet::row_count).sum(),
            total_columns: sheets.iter().map(Sheet::column_count).max().unwrap_or(0),
            source_bytes,
        };
        Self { sheets, metadata }
    }

    /// Sheets in workbook order.
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Look up a sheet by exact name.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }

    pub fn metadata(&self) -> DatasetMetadata {
        self.metadata
    }
}
