//! Rule-based cell rewriting for a [`crate::types::Sheet`].

use serde::{Deserialize, Serialize};

use crate::types::{Cell, Sheet};

/// A single column rewrite.
///
/// Rules target a 0-based column. A rule whose column lies beyond a row's extent leaves that row
/// untouched; absent and empty cells are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransformRule {
    Uppercase { column: usize },
    Lowercase { column: usize },
    Trim { column: usize },
    /// Replace the first literal occurrence of `find` with `replace`.
    ///
    /// Without a non-empty `find` and a `replace` (which may be empty) the rule does nothing.
    Replace {
        column: usize,
        #[serde(default)]
        find: Option<String>,
        #[serde(default)]
        replace: Option<String>,
    },
}

impl TransformRule {
    /// Column index the rule targets.
    pub fn column(&self) -> usize {
        match self {
            Self::Uppercase { column }
            | Self::Lowercase { column }
            | Self::Trim { column }
            | Self::Replace { column, .. } => *column,
        }
    }

    /// Apply the rule to one row in place.
    pub fn apply(&self, row: &mut [Cell]) {
        let Some(cell) = row.get_mut(self.column()) else {
            return;
        };
        if cell.is_blank() {
            return;
        }

        let text = cell.to_text();
        let rewritten = match self {
            Self::Uppercase { .. } => text.to_uppercase(),
            Self::Lowercase { .. } => text.to_lowercase(),
            Self::Trim { .. } => text.trim().to_string(),
            Self::Replace { find, replace, .. } => match (find.as_deref(), replace.as_deref()) {
                (Some(find), Some(replace)) if !find.is_empty() => text.replacen(find, replace, 1),
                _ => return,
            },
        };
        *cell = Cell::Text(rewritten);
    }
}

/// Returns a new [`Sheet`] with every rule applied, in order, to a copy of each row.
///
/// Headers and row count are preserved exactly and the input is never modified.
pub fn transform(sheet: &Sheet, rules: &[TransformRule]) -> Sheet {
    let rows = sheet
        .rows
        .iter()
        .map(|row| {
            let mut out = row.clone();
            for rule in rules {
                rule.apply(&mut out);
            }
            out
        })
        .collect();

    Sheet::new(sheet.name.clone(), sheet.headers.clone(), rows)
}
