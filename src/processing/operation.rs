//! Closed set of operations and their typed parameters.
//!
//! Callers hand in an operation selector string plus a free-form JSON parameter bag.
//! [`OperationRequest::parse`] turns the pair into one typed variant, applying documented defaults
//! for missing parameters and rejecting unknown selectors and malformed bags up front.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};
use crate::types::{Dataset, Sheet};

use super::analyze::{analyze, TextGenerator};
use super::extract::{extract, ExtractPattern};
use super::transform::{transform, TransformRule};
use super::validate::{validate, ColumnSchema, ColumnType, ValidationSchema};

/// Acting component name used for an unrecognised selector.
pub const GENERIC_AGENT: &str = "GenericAgent";

/// The four supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Analyze,
    Transform,
    Validate,
    Extract,
}

impl Operation {
    pub const ALL: [Operation; 4] = [Self::Analyze, Self::Transform, Self::Validate, Self::Extract];

    /// Wire name of the selector.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Transform => "transform",
            Self::Validate => "validate",
            Self::Extract => "extract",
        }
    }

    /// Acting component recorded in the audit log.
    pub fn agent_name(self) -> &'static str {
        match self {
            Self::Analyze => "DataAnalyzer",
            Self::Transform => "DataTransformer",
            Self::Validate => "DataValidator",
            Self::Extract => "DataExtractor",
        }
    }

    /// Acting component for an arbitrary selector, falling back to [`GENERIC_AGENT`].
    pub fn agent_name_for(selector: &str) -> &'static str {
        selector
            .parse::<Operation>()
            .map_or(GENERIC_AGENT, Operation::agent_name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| JobError::UnsupportedOperation(s.to_string()))
    }
}

/// Description of the component behind an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    pub name: &'static str,
    pub operation: Operation,
    pub description: &'static str,
    pub capabilities: &'static [&'static str],
}

const ANALYZER_CAPABILITIES: &[&str] =
    &["schema detection", "data profiling", "statistics generation"];
const TRANSFORMER_CAPABILITIES: &[&str] =
    &["data cleaning", "case normalisation", "literal replacement"];
const VALIDATOR_CAPABILITIES: &[&str] =
    &["schema validation", "data quality checks", "error reporting"];
const EXTRACTOR_CAPABILITIES: &[&str] =
    &["pattern matching", "data extraction", "structured output"];

/// The agents behind the four operations.
pub fn agent_catalog() -> Vec<AgentInfo> {
    Operation::ALL
        .into_iter()
        .map(|operation| {
            let (description, capabilities) = match operation {
                Operation::Analyze => (
                    "Analyzes spreadsheet structure and content",
                    ANALYZER_CAPABILITIES,
                ),
                Operation::Transform => (
                    "Transforms spreadsheet data based on rules",
                    TRANSFORMER_CAPABILITIES,
                ),
                Operation::Validate => (
                    "Validates spreadsheet data against schemas",
                    VALIDATOR_CAPABILITIES,
                ),
                Operation::Extract => (
                    "Extracts matching values from spreadsheet cells",
                    EXTRACTOR_CAPABILITIES,
                ),
            };
            AgentInfo {
                name: operation.agent_name(),
                operation,
                description,
                capabilities,
            }
        })
        .collect()
}

/// Parameters for [`Operation::Analyze`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzeParams {
    /// Extra guidance appended to the generation prompt.
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Parameters for [`Operation::Transform`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformParams {
    /// Target sheet; the first sheet when absent.
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default = "default_transform_rules")]
    pub rules: Vec<TransformRule>,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            sheet: None,
            rules: default_transform_rules(),
        }
    }
}

/// Trim then uppercase column 0.
pub fn default_transform_rules() -> Vec<TransformRule> {
    vec![
        TransformRule::Trim { column: 0 },
        TransformRule::Uppercase { column: 0 },
    ]
}

/// Parameters for [`Operation::Validate`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateParams {
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default = "default_validation_schema")]
    pub schema: ValidationSchema,
}

impl Default for ValidateParams {
    fn default() -> Self {
        Self {
            sheet: None,
            schema: default_validation_schema(),
        }
    }
}

/// Required string, required email, optional number.
pub fn default_validation_schema() -> ValidationSchema {
    ValidationSchema::new(vec![
        ColumnSchema::new(true, Some(ColumnType::String)),
        ColumnSchema::new(true, Some(ColumnType::Email)),
        ColumnSchema::new(false, Some(ColumnType::Number)),
    ])
}

/// Parameters for [`Operation::Extract`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractParams {
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default = "default_extract_patterns")]
    pub patterns: Vec<ExtractPattern>,
}

impl Default for ExtractParams {
    fn default() -> Self {
        Self {
            sheet: None,
            patterns: default_extract_patterns(),
        }
    }
}

const DEFAULT_PATTERNS: [(&str, &str); 3] = [
    ("Emails", r"[\w.+-]+@[\w-]+\.[\w.-]+"),
    ("Phone numbers", r"\+?\d[\d\s().-]{7,}\d"),
    ("URLs", r"https?://[^\s]+"),
];

/// Email, phone number and URL regexes.
pub fn default_extract_patterns() -> Vec<ExtractPattern> {
    DEFAULT_PATTERNS
        .iter()
        .filter_map(|(name, regex)| ExtractPattern::regex(*name, regex).ok())
        .collect()
}

/// An operation together with its validated parameters.
#[derive(Debug, Clone)]
pub enum OperationRequest {
    Analyze(AnalyzeParams),
    Transform(TransformParams),
    Validate(ValidateParams),
    Extract(ExtractParams),
}

impl OperationRequest {
    /// Resolve a selector and its parameter bag.
    ///
    /// A missing or `null` bag selects the operation's defaults; so does any missing field.
    pub fn parse(selector: &str, parameters: Option<&serde_json::Value>) -> JobResult<Self> {
        let operation: Operation = selector.parse()?;
        let request = match operation {
            Operation::Analyze => Self::Analyze(parse_params(operation, parameters)?),
            Operation::Transform => Self::Transform(parse_params(operation, parameters)?),
            Operation::Validate => Self::Validate(parse_params(operation, parameters)?),
            Operation::Extract => Self::Extract(parse_params(operation, parameters)?),
        };
        Ok(request)
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Analyze(_) => Operation::Analyze,
            Self::Transform(_) => Operation::Transform,
            Self::Validate(_) => Operation::Validate,
            Self::Extract(_) => Operation::Extract,
        }
    }

    /// Run the operation over `dataset` and serialize its result.
    pub fn run(
        &self,
        dataset: &Dataset,
        generator: &dyn TextGenerator,
    ) -> JobResult<serde_json::Value> {
        let value = match self {
            Self::Analyze(params) => {
                let report = analyze(dataset, params.instructions.as_deref(), generator)?;
                serde_json::to_value(report)?
            }
            Self::Transform(params) => {
                let sheet = select_sheet(dataset, params.sheet.as_deref())?;
                let out = transform(sheet, &params.rules);
                serde_json::to_value(TransformOutput {
                    sheet: &out.name,
                    headers: &out.headers,
                    row_count: out.row_count(),
                    rules_applied: params.rules.len(),
                    rows: &out.rows,
                })?
            }
            Self::Validate(params) => {
                let sheet = select_sheet(dataset, params.sheet.as_deref())?;
                serde_json::to_value(validate(sheet, &params.schema))?
            }
            Self::Extract(params) => {
                let sheet = select_sheet(dataset, params.sheet.as_deref())?;
                serde_json::to_value(extract(sheet, &params.patterns))?
            }
        };
        Ok(value)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransformOutput<'a> {
    sheet: &'a str,
    headers: &'a [String],
    row_count: usize,
    rules_applied: usize,
    rows: &'a [Vec<crate::types::Cell>],
}

fn parse_params<T>(operation: Operation, parameters: Option<&serde_json::Value>) -> JobResult<T>
where
    T: DeserializeOwned + Default,
{
    match parameters {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => T::deserialize(value).map_err(|e| JobError::InvalidParameters {
            operation: operation.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Pick the named sheet, or the first sheet when no name is given.
pub fn select_sheet<'a>(dataset: &'a Dataset, name: Option<&str>) -> JobResult<&'a Sheet> {
    match name {
        Some(name) => dataset
            .sheet(name)
            .ok_or_else(|| JobError::SheetNotFound(name.to_string())),
        None => dataset.sheets().first().ok_or(JobError::NoSheets),
    }
}
