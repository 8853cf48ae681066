use serde_json::json;

use sheet_jobs::error::GenerationError;
use sheet_jobs::ingestion::decode_dataset;
use sheet_jobs::processing::{
    analyze, dataset_statistics, extract, transform, validate, ExtractPattern, GenerationRequest,
    HeuristicNarrator, Narrative, OperationRequest, TextGenerator, TransformRule, ValidationSchema,
};
use sheet_jobs::types::{Cell, Dataset};
use sheet_jobs::JobError;

fn contacts() -> Dataset {
    decode_dataset(b"Name,Email\nAnn,a@x.com\n,\nBo,not-an-email\n").unwrap()
}

struct CannedGenerator(&'static str);

impl TextGenerator for CannedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<Narrative, GenerationError> {
        assert!(request.prompt.contains("\"totalRows\""));
        assert!(request.output_schema["properties"]["summary"].is_object());
        Ok(Narrative {
            summary: self.0.to_string(),
            recommendations: vec!["keep going".to_string()],
            insights: Vec::new(),
        })
    }
}

struct Unreachable;

impl TextGenerator for Unreachable {
    fn generate(&self, _request: &GenerationRequest) -> Result<Narrative, GenerationError> {
        Err(GenerationError::Unavailable("model endpoint refused connection".to_string()))
    }
}

#[test]
fn validate_reports_required_and_email_errors_per_display_row() {
    let ds = contacts();
    let schema: ValidationSchema = serde_json::from_value(json!({
        "columns": [
            { "required": true, "type": "string" },
            { "required": true, "type": "email" }
        ]
    }))
    .unwrap();

    let report = validate(&ds.sheets()[0], &schema);
    assert_eq!((report.total_rows, report.valid_rows, report.invalid_rows), (3, 1, 2));
    assert!(!report.valid);

    let found: Vec<(usize, usize, &str)> = report
        .errors
        .iter()
        .map(|e| (e.row, e.column, e.message.as_str()))
        .collect();
    assert_eq!(
        found,
        vec![
            (3, 0, "Column 1 is required"),
            (3, 1, "Column 2 is required"),
            (4, 1, "Column 2 must be a valid email"),
        ]
    );
}

#[test]
fn extract_counts_every_regex_match_in_a_cell() {
    let ds = decode_dataset(b"Notes\ncontact a@b.com or c@d.org\nnothing here\n").unwrap();
    let pattern: ExtractPattern = serde_json::from_value(json!({
        "name": "Emails", "type": "regex", "regex": "[\\w.]+@[\\w.]+\\.\\w+"
    }))
    .unwrap();

    let results = extract(&ds.sheets()[0], &[pattern]);
    assert_eq!(results[0].match_count, 2);
    assert_eq!(results[0].matches.len(), 1);
    assert_eq!(results[0].matches[0].row, 2);

    let wire = serde_json::to_value(&results).unwrap();
    assert_eq!(wire[0]["matchCount"], 2);
    assert_eq!(wire[0]["matches"][0]["matches"], json!(["a@b.com", "c@d.org"]));
}

#[test]
fn transform_keeps_shape_and_never_touches_the_input() {
    let ds = decode_dataset(b"Name,City\n  ann ,paris\nbo\n,lyon\n").unwrap();
    let sheet = &ds.sheets()[0];
    let rules = vec![
        TransformRule::Trim { column: 0 },
        TransformRule::Uppercase { column: 1 },
        TransformRule::Replace {
            column: 1,
            find: Some("L".to_string()),
            replace: Some("l".to_string()),
        },
        TransformRule::Lowercase { column: 7 },
    ];

    let out = transform(sheet, &rules);
    assert_eq!(out.headers, sheet.headers);
    assert_eq!(out.row_count(), sheet.row_count());
    assert_eq!(out.rows[0], vec![Cell::from("ann"), Cell::from("PARIS")]);
    assert_eq!(out.rows[1], vec![Cell::from("bo")]);
    assert_eq!(out.rows[2], vec![Cell::Empty, Cell::from("lYON")]);
    assert_eq!(sheet.rows[0][0], Cell::from("  ann "));

    let twice = transform(&out, &[TransformRule::Trim { column: 0 }]);
    assert_eq!(twice, transform(&twice, &[TransformRule::Trim { column: 0 }]));
}

#[test]
fn analyze_statistics_do_not_depend_on_the_generator() {
    let ds = decode_dataset(
        b"Name,Joined,Score,Active,Blank\nAnn,2024-03-05,1.5,true\nBo,2024-04-01,2,false\n",
    )
    .unwrap();

    let stats = dataset_statistics(&ds);
    assert_eq!(stats.sheets, vec!["Sheet1"]);
    assert_eq!((stats.total_sheets, stats.total_rows, stats.total_columns), (1, 2, 5));
    let types = stats.data_types;
    assert_eq!(
        (types.numeric, types.text, types.date, types.boolean, types.empty),
        (1, 1, 1, 1, 1)
    );

    let canned = analyze(&ds, Some("focus on dates"), &CannedGenerator("two members")).unwrap();
    let heuristic = analyze(&ds, None, &HeuristicNarrator).unwrap();
    assert_eq!(canned.statistics, heuristic.statistics);
    assert_eq!(canned.narrative.summary, "two members");

    let wire = serde_json::to_value(&canned).unwrap();
    assert_eq!(wire["totalRows"], 2);
    assert_eq!(wire["dataTypes"]["date"], 1);
    assert_eq!(wire["summary"], "two members");
}

#[test]
fn generation_failures_surface_as_operation_failures() {
    let ds = contacts();
    let err = OperationRequest::parse("analyze", None)
        .unwrap()
        .run(&ds, &Unreachable)
        .unwrap_err();
    assert!(matches!(err, JobError::Generation(GenerationError::Unavailable(_))));
    assert_eq!(err.to_string(), "text generation unavailable: model endpoint refused connection");

    let empty = analyze(&ds, None, &CannedGenerator("   ")).unwrap_err();
    assert!(matches!(empty, GenerationError::InvalidResponse(_)));
}

#[test]
fn column_patterns_are_checked_and_compiled_up_front() {
    let ds = decode_dataset(b"Code\nAB-12\nxx\n\n").unwrap();
    let out = OperationRequest::parse(
        "validate",
        Some(&json!({ "schema": { "columns": [{ "pattern": "^[A-Z]{2}-\\d+$" }] } })),
    )
    .unwrap()
    .run(&ds, &HeuristicNarrator)
    .unwrap();
    assert_eq!(out["invalidRows"], 1);
    assert_eq!(out["errors"][0]["message"], "Column 1 does not match pattern");
    assert_eq!(out["errors"][0]["row"], 3);

    let bad_pattern = json!({ "schema": { "columns": [{ "pattern": "(" }] } });
    let err = OperationRequest::parse("validate", Some(&bad_pattern)).unwrap_err();
    assert!(matches!(err, JobError::InvalidParameters { .. }));
}
