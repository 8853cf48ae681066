//! Structural analysis of a [`crate::types::Dataset`].
//!
//! The statistics ([`DatasetStatistics`]) are computed deterministically from the data. Only the
//! narrative part of the report (summary, recommendations, insights) comes from a
//! [`TextGenerator`], which is usually an external model; [`HeuristicNarrator`] is a built-in,
//! offline implementation.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::GenerationError;
use crate::types::{Cell, Dataset, Sheet};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Coarse type of a column, decided by the majority of its present values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Date,
    Boolean,
    Text,
    /// No present values at all.
    Empty,
}

/// Column counts per [`ColumnKind`], across all sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeHistogram {
    pub numeric: usize,
    pub text: usize,
    pub date: usize,
    pub boolean: usize,
    pub empty: usize,
}

impl TypeHistogram {
    fn record(&mut self, kind: ColumnKind) {
        match kind {
            ColumnKind::Numeric => self.numeric += 1,
            ColumnKind::Date => self.date += 1,
            ColumnKind::Boolean => self.boolean += 1,
            ColumnKind::Text => self.text += 1,
            ColumnKind::Empty => self.empty += 1,
        }
    }

    /// Total number of classified columns.
    pub fn total(&self) -> usize {
        self.numeric + self.text + self.date + self.boolean + self.empty
    }
}

/// Deterministic structural statistics for a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStatistics {
    /// Sheet names in workbook order.
    pub sheets: Vec<String>,
    pub total_sheets: usize,
    pub total_rows: usize,
    /// Widest header row across sheets.
    pub total_columns: usize,
    pub data_types: TypeHistogram,
}

/// Narrative produced by a [`TextGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Narrative {
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
}

/// Prompt handed to a [`TextGenerator`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    /// The statistics the prompt describes.
    pub statistics: DatasetStatistics,
    /// JSON Schema of the full report the generator is asked to fill in.
    pub output_schema: serde_json::Value,
}

/// External text-generation capability used by [`analyze`].
///
/// Implementations are responsible for bounding their own latency.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<Narrative, GenerationError>;
}

/// The complete analysis result: statistics plus narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    #[serde(flatten)]
    pub statistics: DatasetStatistics,
    #[serde(flatten)]
    pub narrative: Narrative,
}

/// Compute statistics for `dataset` without any external help.
pub fn dataset_statistics(dataset: &Dataset) -> DatasetStatistics {
    let meta = dataset.metadata();
    let mut data_types = TypeHistogram::default();
    for sheet in dataset.sheets() {
        for column in 0..sheet.column_count() {
            data_types.record(classify_column(sheet, column));
        }
    }

    DatasetStatistics {
        sheets: dataset.sheet_names().map(str::to_string).collect(),
        total_sheets: meta.total_sheets,
        total_rows: meta.total_rows,
        total_columns: meta.total_columns,
        data_types,
    }
}

/// Classify one column by majority vote over its present values.
///
/// Ties resolve in the order numeric, date, boolean, text.
pub fn classify_column(sheet: &Sheet, column: usize) -> ColumnKind {
    // numeric, date, boolean, text
    let mut votes = [0usize; 4];
    for row in 0..sheet.row_count() {
        let slot = match sheet.cell(row, column) {
            cell if cell.is_blank() => continue,
            Cell::Number(_) => 0,
            Cell::Bool(_) => 2,
            Cell::Text(s) if s.trim().parse::<f64>().is_ok_and(f64::is_finite) => 0,
            Cell::Text(s) if looks_like_date(s.trim()) => 1,
            _ => 3,
        };
        votes[slot] += 1;
    }

    let kinds = [
        ColumnKind::Numeric,
        ColumnKind::Date,
        ColumnKind::Boolean,
        ColumnKind::Text,
    ];
    let best = votes.iter().copied().max().unwrap_or(0);
    if best == 0 {
        return ColumnKind::Empty;
    }
    votes
        .iter()
        .position(|&v| v == best)
        .map_or(ColumnKind::Empty, |idx| kinds[idx])
}

fn looks_like_date(s: &str) -> bool {
    DATE_FORMATS
        .iter()
        .any(|f| NaiveDate::parse_from_str(s, f).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
        || DateTime::parse_from_rfc3339(s).is_ok()
}

/// JSON Schema describing [`AnalysisReport`].
pub fn report_schema() -> serde_json::Value {
    let count = json!({ "type": "integer", "minimum": 0 });
    let strings = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "required": [
            "sheets",
            "totalSheets",
            "totalRows",
            "totalColumns",
            "dataTypes",
            "summary",
            "recommendations",
            "insights",
        ],
        "properties": {
            "sheets": strings,
            "totalSheets": count,
            "totalRows": count,
            "totalColumns": count,
            "dataTypes": {
                "type": "object",
                "properties": {
                    "numeric": count,
                    "text": count,
                    "date": count,
                    "boolean": count,
                    "empty": count,
                },
            },
            "summary": { "type": "string" },
            "recommendations": strings,
            "insights": strings,
        },
    })
}

/// Build the prompt for `statistics`, optionally extended with caller `instructions`.
pub fn build_prompt(statistics: &DatasetStatistics, instructions: Option<&str>) -> String {
    let stats = serde_json::to_string(statistics).unwrap_or_default();
    let mut prompt = format!(
        "Analyze this spreadsheet data: {stats}. \
         Provide a short summary, insights and recommendations."
    );
    if let Some(extra) = instructions.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\nAdditional instructions: ");
        prompt.push_str(extra.trim());
    }
    prompt
}

/// Compute statistics, ask `generator` for a narrative and combine both.
///
/// A generator failure is returned unchanged; it is never replaced by a fallback narrative.
pub fn analyze(
    dataset: &Dataset,
    instructions: Option<&str>,
    generator: &dyn TextGenerator,
) -> Result<AnalysisReport, GenerationError> {
    let statistics = dataset_statistics(dataset);
    let request = GenerationRequest {
        prompt: build_prompt(&statistics, instructions),
        statistics: statistics.clone(),
        output_schema: report_schema(),
    };
    let narrative = generator.generate(&request)?;
    if narrative.summary.trim().is_empty() {
        return Err(GenerationError::InvalidResponse("summary is empty".to_string()));
    }

    Ok(AnalysisReport {
        statistics,
        narrative,
    })
}

/// Deterministic, offline [`TextGenerator`] that derives its narrative from the statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicNarrator;

impl TextGenerator for HeuristicNarrator {
    fn generate(&self, request: &GenerationRequest) -> Result<Narrative, GenerationError> {
        let stats = &request.statistics;
        let types = stats.data_types;

        let summary = format!(
            "Workbook with {} sheet(s) ({}) holding {} data row(s) across up to {} column(s).",
            stats.total_sheets,
            stats.sheets.join(", "),
            stats.total_rows,
            stats.total_columns,
        );

        let mut insights = vec![format!(
            "Column types: {} numeric, {} text, {} date, {} boolean, {} empty.",
            types.numeric, types.text, types.date, types.boolean, types.empty
        )];
        if types.total() > 0 && types.numeric * 2 >= types.total() {
            insights.push(
                "Most columns are numeric; the data suits aggregation and charting.".to_string(),
            );
        }

        let mut recommendations = Vec::new();
        if stats.total_rows == 0 {
            recommendations
                .push("Add data rows below the header row before processing.".to_string());
        }
        if types.empty > 0 {
            recommendations.push(format!(
                "Fill or drop the {} column(s) that contain no values.",
                types.empty
            ));
        }
        if types.date > 0 {
            recommendations.push(
                "Store dates in a single ISO-8601 format to keep sorting reliable.".to_string(),
            );
        }
        if types.text > 0 {
            recommendations.push(
                "Run the validate operation to check required text and email columns.".to_string(),
            );
        }
        if recommendations.is_empty() {
            recommendations.push("No structural issues found.".to_string());
        }

        Ok(Narrative {
            summary,
            recommendations,
            insights,
        })
    }
}
