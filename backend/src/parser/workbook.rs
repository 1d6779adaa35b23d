//! Spreadsheet workbook reader (first sheet, header row first).

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::Cursor;

use crate::error::{IngestError, IngestResult};
use crate::models::RawCell;

use super::{normalize_headers, RawTable, SourceFormat, SourceInfo};

/// Parse the first worksheet of an in-memory workbook.
pub fn parse_workbook(bytes: &[u8]) -> IngestResult<RawTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| IngestError::Workbook(e.to_string()))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::Workbook("workbook has no worksheets".to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::Workbook("no first sheet".to_string()))?
        .map_err(|e| IngestError::Workbook(e.to_string()))?;

    let mut rows = range.rows();
    let header_row = rows.next().ok_or(IngestError::EmptyInput)?;
    let headers = normalize_headers(header_row.iter().map(header_text).collect())?;

    let mut data = Vec::new();
    for row in rows {
        let cells: Vec<RawCell> = (0..headers.len())
            .map(|i| row.get(i).map(raw_cell).unwrap_or(RawCell::Empty))
            .collect();
        if cells.iter().all(RawCell::is_empty) {
            continue;
        }
        data.push(cells);
    }

    let info = SourceInfo {
        format: SourceFormat::Workbook,
        encoding: None,
        delimiter: None,
        sheet: Some(sheet),
        headers: headers.clone(),
        row_count: data.len(),
    };

    Ok(RawTable {
        headers,
        rows: data,
        info,
    })
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a workbook cell, keeping its type.
pub(crate) fn raw_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Float(f) => RawCell::Number(*f),
        Data::String(s) => RawCell::text(s.clone()),
        Data::Bool(b) => RawCell::Bool(*b),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(RawCell::DateTime)
            .unwrap_or(RawCell::Empty),
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(RawCell::DateTime)
            .unwrap_or_else(|| RawCell::text(s.clone())),
        Data::DurationIso(s) => RawCell::text(s.clone()),
        // error cells (#DIV/0!, #N/A, ...) and blanks
        _ => RawCell::Empty,
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
