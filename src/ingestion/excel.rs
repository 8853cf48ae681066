//! Workbook decoding (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`, `.ods`) via `calamine`.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::{Duration, NaiveDate, NaiveTime};

use crate::error::DecodeResult;
use crate::types::{Cell, Sheet};

/// Decode every sheet of an in-memory workbook, in workbook order.
///
/// Behavior:
/// - The first row of each sheet's used range is the header row; every later row is data
/// - Header cells are coerced to strings; absent header cells become `""`
/// - A sheet with a header row only (or nothing at all) is kept with zero rows
/// - Trailing absent cells are dropped, so rows can be shorter than the header list
pub fn decode_workbook(bytes: &[u8]) -> DecodeResult<Vec<Sheet>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        sheets.push(sheet_from_range(name, &range));
    }
    Ok(sheets)
}

fn sheet_from_range(name: String, range: &Range<Data>) -> Sheet {
    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(first) => header_labels(first),
        None => Vec::new(),
    };
    let data = rows.map(data_row).collect();
    Sheet::new(name, headers, data)
}

fn header_labels(row: &[Data]) -> Vec<String> {
    let width = used_width(row);
    row[..width].iter().map(cell_to_header_string).collect()
}

fn data_row(row: &[Data]) -> Vec<Cell> {
    let width = used_width(row);
    row[..width].iter().map(convert_cell).collect()
}

fn used_width(row: &[Data]) -> usize {
    row.iter()
        .rposition(|c| !matches!(c, Data::Empty))
        .map_or(0, |idx| idx + 1)
}

fn cell_to_header_string(c: &Data) -> String {
    match convert_cell(c) {
        Cell::Empty => String::new(),
        other => other.to_text(),
    }
}

fn convert_cell(c: &Data) -> Cell {
    match c {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            if dt.is_duration() {
                Cell::Number(serial)
            } else {
                excel_serial_to_iso(serial).map_or(Cell::Number(serial), Cell::Text)
            }
        }
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

// Serial 2958465 is 9999-12-31, the last day Excel can represent.
const MAX_EXCEL_SERIAL: f64 = 2_958_466.0;

/// Render a 1900-system Excel serial date as ISO-8601 text.
///
/// Midnight values render as a plain date (`2024-03-01`); anything with a time part renders as
/// `2024-03-01T13:30:00`.
fn excel_serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() || !(0.0..MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let seconds = (serial * 86_400.0).round() as i64;
    let at = epoch.checked_add_signed(Duration::seconds(seconds))?;
    if at.time() == NaiveTime::MIN {
        Some(at.format("%Y-%m-%d").to_string())
    } else {
        Some(at.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}
