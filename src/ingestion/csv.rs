//! Delimited text decoding.

use crate::error::DecodeResult;
use crate::types::{Cell, Sheet};

/// Name given to the single sheet produced from delimited text.
pub const DELIMITED_SHEET_NAME: &str = "Sheet1";

/// Decode UTF-8 comma-separated text into a single [`Sheet`].
///
/// Rules:
///
/// - The first record is the header row; later records are data rows.
/// - Records may have differing lengths; trailing empty fields are dropped.
/// - Numeric literals become [`Cell::Number`], `TRUE`/`FALSE` (any case) become [`Cell::Bool`],
///   empty fields become [`Cell::Empty`], and everything else stays text.
pub fn decode_delimited(bytes: &[u8]) -> DecodeResult<Sheet> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for (idx0, result) in rdr.records().enumerate() {
        let record = result?;
        let fields: Vec<&str> = record.iter().collect();
        let width = fields
            .iter()
            .rposition(|field| !field.is_empty())
            .map_or(0, |idx| idx + 1);
        let fields = &fields[..width];

        if idx0 == 0 {
            headers = fields.iter().map(|field| (*field).to_owned()).collect();
        } else {
            rows.push(fields.iter().copied().map(parse_field).collect());
        }
    }

    Ok(Sheet::new(DELIMITED_SHEET_NAME, headers, rows))
}

fn parse_field(raw: &str) -> Cell {
    if raw.is_empty() {
        return Cell::Empty;
    }

    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => return Cell::Number(n),
        _ => {}
    }
    if trimmed.eq_ignore_ascii_case("true") {
        Cell::Bool(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Cell::Bool(false)
    } else {
        Cell::Text(raw.to_owned())
    }
}
