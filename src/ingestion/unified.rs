//! Unified decoding entrypoint.
//!
//! Most callers should use [`decode_dataset`], which sniffs the container format from the leading
//! bytes and decodes the whole spreadsheet into an in-memory [`crate::types::Dataset`].

use tracing::debug;

use crate::error::{DecodeError, DecodeResult};
use crate::types::Dataset;

use super::{csv, excel};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Spreadsheet container formats recognised by [`decode_dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// Zip-based workbooks: `.xlsx`, `.xlsm`, `.xlsb`, `.ods`.
    Zip,
    /// Legacy OLE compound documents: `.xls`.
    Ole,
    /// UTF-8 comma-separated text.
    Delimited,
}

impl SpreadsheetFormat {
    /// Detect the container format from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> DecodeResult<Self> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.starts_with(ZIP_MAGIC) {
            return Ok(Self::Zip);
        }
        if bytes.starts_with(OLE_MAGIC) {
            return Ok(Self::Ole);
        }
        match std::str::from_utf8(bytes) {
            Ok(text) if !text.contains('\0') => Ok(Self::Delimited),
            _ => Err(DecodeError::UnsupportedFormat(format!(
                "unrecognised binary signature {:02x?}",
                &bytes[..bytes.len().min(8)]
            ))),
        }
    }
}

/// Decode raw spreadsheet bytes into a [`Dataset`].
///
/// Aggregates are computed over all sheets: total rows is the sum of per-sheet row counts and
/// total columns is the widest header row.
///
/// # Examples
///
/// ```rust
/// use sheet_jobs::ingestion::decode_dataset;
///
/// # fn main() -> Result<(), sheet_jobs::DecodeError> {
/// let ds = decode_dataset(b"Name,Email\nAnn,a@x.com\n")?;
/// assert_eq!(ds.metadata().total_rows, 1);
/// assert_eq!(ds.metadata().total_columns, 2);
/// # Ok(())
/// # }
/// ```
pub fn decode_dataset(bytes: &[u8]) -> DecodeResult<Dataset> {
    let format = SpreadsheetFormat::sniff(bytes)?;
    let sheets = match format {
        SpreadsheetFormat::Zip | SpreadsheetFormat::Ole => excel::decode_workbook(bytes)?,
        SpreadsheetFormat::Delimited => vec![csv::decode_delimited(bytes)?],
    };

    let dataset = Dataset::new(sheets, bytes.len());
    let meta = dataset.metadata();
    debug!(
        ?format,
        sheets = meta.total_sheets,
        rows = meta.total_rows,
        columns = meta.total_columns,
        bytes = meta.source_bytes,
        "decoded spreadsheet"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::{decode_dataset, SpreadsheetFormat};
    use crate::error::DecodeError;

    #[test]
    fn zero_length_input_is_rejected() {
        assert!(matches!(decode_dataset(b""), Err(DecodeError::Empty)));
    }

    #[test]
    fn unknown_binary_is_unsupported() {
        let err = decode_dataset(&[0x00, 0x01, 0xFF, 0xFE, 0x00]).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
    }

    #[test]
    fn truncated_zip_is_a_malformed_workbook() {
        assert_eq!(
            SpreadsheetFormat::sniff(b"PK\x03\x04garbage").unwrap(),
            SpreadsheetFormat::Zip
        );
        let err = decode_dataset(b"PK\x03\x04garbage").unwrap_err();
        assert!(matches!(err, DecodeError::Workbook(_)));
    }

    #[test]
    fn delimited_text_becomes_a_single_sheet() {
        let ds = decode_dataset(b"a,b\n1,2\n3,4\n").unwrap();
        let meta = ds.metadata();
        assert_eq!(meta.total_sheets, 1);
        assert_eq!(meta.total_rows, 2);
        assert_eq!(meta.total_columns, 2);
        assert_eq!(meta.source_bytes, 12);
    }
}
