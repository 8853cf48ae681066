//! Pattern extraction over the cells of a [`crate::types::Sheet`].

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Sheet;

use super::validate::DISPLAY_ROW_OFFSET;

/// Maximum number of matches reported per pattern. `match_count` is never truncated.
pub const MAX_REPORTED_MATCHES: usize = 10;

/// How a pattern tests a cell.
#[derive(Debug, Clone)]
pub enum PatternKind {
    /// Regular expression, matched globally within each cell.
    Regex(Regex),
    /// Case-insensitive literal substring; at most one match per cell.
    Contains(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawPatternKind {
    Regex { regex: String },
    Contains { text: String },
}

#[derive(Debug, Clone, Deserialize)]
struct RawExtractPattern {
    name: String,
    #[serde(flatten)]
    kind: RawPatternKind,
}

/// A named pattern to look for.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawExtractPattern")]
pub struct ExtractPattern {
    pub name: String,
    pub kind: PatternKind,
}

impl ExtractPattern {
    /// Build a regex pattern.
    pub fn regex(name: impl Into<String>, regex: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            kind: PatternKind::Regex(Regex::new(regex)?),
        })
    }

    /// Build a case-insensitive substring pattern.
    pub fn contains(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PatternKind::Contains(text.into().to_lowercase()),
        }
    }
}

impl TryFrom<RawExtractPattern> for ExtractPattern {
    type Error = String;

    fn try_from(raw: RawExtractPattern) -> Result<Self, Self::Error> {
        match raw.kind {
            RawPatternKind::Regex { regex } => Self::regex(raw.name.clone(), &regex)
                .map_err(|e| format!("pattern '{}': {e}", raw.name)),
            RawPatternKind::Contains { text } if text.is_empty() => {
                Err(format!("pattern '{}': contains text must not be empty", raw.name))
            }
            RawPatternKind::Contains { text } => Ok(Self::contains(raw.name, text)),
        }
    }
}

/// A cell that matched a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractMatch {
    /// Sheet row number (data index + 2, same convention as validation).
    pub row: usize,
    /// 0-based column index.
    pub column: usize,
    /// Full text of the matching cell.
    pub value: String,
    /// Every substring matched in the cell (regex patterns only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<String>>,
}

/// Matches found for one pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResult {
    /// Name of the pattern.
    pub pattern: String,
    /// True number of matches across the sheet: every regex match within a cell counts, a
    /// `contains` pattern counts once per matching cell.
    pub match_count: usize,
    /// The first [`MAX_REPORTED_MATCHES`] matching cells, in row-major order.
    pub matches: Vec<ExtractMatch>,
}

/// Run every pattern over every present cell of `sheet`, returning one result per pattern in
/// the order given.
pub fn extract(sheet: &Sheet, patterns: &[ExtractPattern]) -> Vec<ExtractResult> {
    patterns.iter().map(|p| extract_one(sheet, p)).collect()
}

fn extract_one(sheet: &Sheet, pattern: &ExtractPattern) -> ExtractResult {
    let mut match_count = 0usize;
    let mut matches = Vec::new();

    for (row_idx, row) in sheet.rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            if cell.is_absent() {
                continue;
            }
            let value = cell.to_text();
            let found = match &pattern.kind {
                PatternKind::Regex(re) => {
                    let hits: Vec<String> = re
                        .find_iter(&value)
                        .map(|m| m.as_str().to_string())
                        .collect();
                    (!hits.is_empty()).then_some(Some(hits))
                }
                PatternKind::Contains(needle) => value
                    .to_lowercase()
                    .contains(needle.as_str())
                    .then_some(None),
            };

            let Some(hits) = found else {
                continue;
            };
            match_count += hits.as_ref().map_or(1, Vec::len);
            if matches.len() < MAX_REPORTED_MATCHES {
                matches.push(ExtractMatch {
                    row: row_idx + DISPLAY_ROW_OFFSET,
                    column: col_idx,
                    value,
                    matches: hits,
                });
            }
        }
    }

    ExtractResult {
        pattern: pattern.name.clone(),
        match_count,
        matches,
    }
}
