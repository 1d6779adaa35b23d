//! Upload ingestion: bytes in, raw table out.
//!
//! Two readers sit behind one entry point:
//!
//! - [`delimited`] - CSV/TSV text with encoding and delimiter auto-detection
//! - [`workbook`] - first sheet of an xlsx/xls/ods workbook
//!
//! Headers are taken literally from the first row. Anything that prevents
//! reading the table at all is an [`IngestError`] and aborts the invocation.

pub mod delimited;
pub mod workbook;

use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{IngestError, IngestResult};
use crate::models::RawCell;

pub use delimited::{decode_content, detect_delimiter, detect_encoding, parse_delimited};
pub use workbook::parse_workbook;

/// Upload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Workbook,
}

impl SourceFormat {
    /// Detect the format from the file name, falling back to magic bytes.
    pub fn detect(bytes: &[u8], file_name: Option<&str>) -> IngestResult<Self> {
        if let Some(ext) = file_name.and_then(extension_of) {
            match ext.as_str() {
                "csv" | "txt" | "tsv" => return Ok(SourceFormat::Csv),
                "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => return Ok(SourceFormat::Workbook),
                "parquet" | "json" | "pdf" => return Err(IngestError::UnsupportedFormat(ext)),
                _ => {}
            }
        }
        Ok(Self::sniff(bytes))
    }

    /// ZIP (xlsx/ods) and OLE2 (xls) containers are workbooks; anything else is text.
    pub fn sniff(bytes: &[u8]) -> Self {
        const ZIP: &[u8] = b"PK\x03\x04";
        const OLE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
        if bytes.starts_with(ZIP) || bytes.starts_with(OLE) {
            SourceFormat::Workbook
        } else {
            SourceFormat::Csv
        }
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Metadata about the parsed upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub format: SourceFormat,
    /// Detected text encoding (CSV only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Detected delimiter (CSV only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    /// Sheet that was read (workbook only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of parsing: header row, data rows, metadata.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// Every row has exactly `headers.len()` cells.
    pub rows: Vec<Vec<RawCell>>,
    pub info: SourceInfo,
}

impl RawTable {
    /// Rows as JSON objects keyed by header, cells untyped-as-read.
    pub fn preview(&self, limit: usize) -> Vec<JsonValue> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                let obj: Map<String, JsonValue> = self
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(h, cell)| (h.clone(), cell_json(cell)))
                    .collect();
                JsonValue::Object(obj)
            })
            .collect()
    }
}

fn cell_json(cell: &RawCell) -> JsonValue {
    match cell {
        RawCell::Empty => JsonValue::Null,
        RawCell::Text(s) => json!(s),
        RawCell::Number(n) => json!(n),
        RawCell::Bool(b) => json!(b),
        RawCell::DateTime(dt) => json!(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
    }
}

/// Parse an upload, choosing the reader from the file name or content.
pub fn parse_bytes(bytes: &[u8], file_name: Option<&str>) -> IngestResult<RawTable> {
    if bytes.is_empty() {
        return Err(IngestError::EmptyInput);
    }

    match SourceFormat::detect(bytes, file_name)? {
        SourceFormat::Csv => parse_delimited(bytes),
        SourceFormat::Workbook => parse_workbook(bytes),
    }
}

/// Parse a file on disk.
pub fn parse_file<P: AsRef<Path>>(path: P) -> IngestResult<RawTable> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    parse_bytes(&bytes, path.file_name().and_then(|n| n.to_str()))
}

/// Name empty header cells `column_<n>` and suffix duplicates `.1`, `.2`, ...
///
/// Non-empty, unique headers are kept byte for byte.
pub(crate) fn normalize_headers(raw: Vec<String>) -> IngestResult<Vec<String>> {
    if raw.iter().all(|h| h.is_empty()) {
        return Err(IngestError::NoHeaders);
    }

    let mut seen = HashSet::new();
    let mut headers = Vec::with_capacity(raw.len());

    for (i, header) in raw.into_iter().enumerate() {
        let base = if header.is_empty() {
            format!("column_{}", i + 1)
        } else {
            header
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while !seen.insert(name.clone()) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        headers.push(name);
    }

    Ok(headers)
}
