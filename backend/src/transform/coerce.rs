//! Type coercion: raw cells to typed values according to the dashboard vocabulary.
//!
//! A cell that cannot be read as its column's kind becomes [`Value::Missing`]
//! and is counted in [`CoercionStats`]. Coercion never fails as a whole.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::dashboard::Vocabulary;
use crate::models::{format_number, Column, ColumnKind, Dataset, RawCell, Value};
use crate::parser::RawTable;

/// `a/b/yyyy`, `a.b.yy`, `a-b-yyyy`.
static NUMERIC_DATE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{2}|\d{4})$").ok());

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d-%b-%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Non-empty cells that could not be coerced, per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoercionStats {
    pub failures: BTreeMap<String, usize>,
}

impl CoercionStats {
    pub fn total(&self) -> usize {
        self.failures.values().sum()
    }
}

/// Coerce every column of `raw`. Column order and names are kept.
pub fn coerce(raw: &RawTable, vocabulary: &Vocabulary) -> (Dataset, CoercionStats) {
    let columns: Vec<Column> = raw
        .headers
        .iter()
        .map(|name| Column {
            name: name.clone(),
            kind: vocabulary.kind_of(name),
            derived: false,
        })
        .collect();

    let mut stats = CoercionStats::default();
    let mut records = Vec::with_capacity(raw.rows.len());

    for row in &raw.rows {
        let record: Vec<Value> = columns
            .iter()
            .zip(row)
            .map(|(column, cell)| {
                let value = coerce_cell(cell, column.kind, vocabulary.day_first);
                if value.is_missing() && !cell.is_empty() {
                    *stats.failures.entry(column.name.clone()).or_default() += 1;
                }
                value
            })
            .collect();
        records.push(record);
    }

    (Dataset::new(columns, records), stats)
}

pub fn coerce_cell(cell: &RawCell, kind: ColumnKind, day_first: bool) -> Value {
    match kind {
        ColumnKind::Numeric => coerce_number(cell).map(Value::Number).unwrap_or(Value::Missing),
        ColumnKind::Temporal => coerce_date(cell, day_first).map(Value::Date).unwrap_or(Value::Missing),
        ColumnKind::Categorical => coerce_label(cell).map(Value::Text).unwrap_or(Value::Missing),
        ColumnKind::Passthrough => passthrough(cell),
    }
}

/// Finite number from a numeric cell, numeric text, or a boolean.
pub fn coerce_number(cell: &RawCell) -> Option<f64> {
    let n = match cell {
        RawCell::Number(n) => *n,
        RawCell::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        RawCell::Text(s) => s.trim().parse::<f64>().ok()?,
        RawCell::Empty | RawCell::DateTime(_) => return None,
    };
    n.is_finite().then_some(n)
}

/// Calendar date from a workbook date-time or date text.
pub fn coerce_date(cell: &RawCell, day_first: bool) -> Option<NaiveDate> {
    match cell {
        RawCell::DateTime(dt) => Some(dt.date()),
        RawCell::Text(s) => parse_date(s.trim(), day_first),
        _ => None,
    }
}

/// Parse date text. Ambiguous `a/b/yyyy` reads as day/month when `day_first`.
pub fn parse_date(s: &str, day_first: bool) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    {
        return Some(date);
    }

    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt.date());
    }

    let caps = NUMERIC_DATE.as_ref()?.captures(s)?;
    let a: u32 = caps[1].parse().ok()?;
    let b: u32 = caps[2].parse().ok()?;
    let year_text = &caps[3];
    let mut year: i32 = year_text.parse().ok()?;
    if year_text.len() == 2 {
        year += if year <= 68 { 2000 } else { 1900 };
    }

    let (day, month) = if day_first { (a, b) } else { (b, a) };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn coerce_label(cell: &RawCell) -> Option<String> {
    match cell {
        RawCell::Empty => None,
        RawCell::Text(s) => Some(s.clone()),
        RawCell::Number(n) => Some(format_number(*n)),
        RawCell::Bool(b) => Some(b.to_string()),
        RawCell::DateTime(dt) => Some(datetime_text(dt)),
    }
}

fn passthrough(cell: &RawCell) -> Value {
    match cell {
        RawCell::Empty => Value::Missing,
        RawCell::Text(s) => Value::Text(s.clone()),
        RawCell::Number(n) => Value::Number(*n),
        RawCell::Bool(b) => Value::Bool(*b),
        RawCell::DateTime(dt) if dt.time().num_seconds_from_midnight() == 0 => {
            Value::Date(dt.date())
        }
        RawCell::DateTime(dt) => Value::Text(datetime_text(dt)),
    }
}

fn datetime_text(dt: &NaiveDateTime) -> String {
    if dt.time().num_seconds_from_midnight() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{SourceFormat, SourceInfo};

    fn text(s: &str) -> RawCell {
        RawCell::text(s)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn table(headers: &[&str], rows: Vec<Vec<RawCell>>) -> RawTable {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        RawTable {
            info: SourceInfo {
                format: SourceFormat::Csv,
                encoding: Some("UTF-8".into()),
                delimiter: Some(','),
                sheet: None,
                headers: headers.clone(),
                row_count: rows.len(),
            },
            headers,
            rows,
        }
    }

    #[test]
    fn test_numbers() {
        assert_eq!(coerce_number(&text(" 250.50 ")), Some(250.5));
        assert_eq!(coerce_number(&text("-3")), Some(-3.0));
        assert_eq!(coerce_number(&RawCell::Number(2.0)), Some(2.0));
        assert_eq!(coerce_number(&RawCell::Bool(true)), Some(1.0));
        assert_eq!(coerce_number(&text("abc")), None);
        assert_eq!(coerce_number(&text("NaN")), None);
        assert_eq!(coerce_number(&text("inf")), None);
        assert_eq!(coerce_number(&RawCell::Empty), None);
    }

    #[test]
    fn test_iso_and_named_dates() {
        assert_eq!(parse_date("2023-01-15", false), Some(ymd(2023, 1, 15)));
        assert_eq!(parse_date("2023/02/10", false), Some(ymd(2023, 2, 10)));
        assert_eq!(parse_date("2023-01-15T08:30:00", false), Some(ymd(2023, 1, 15)));
        assert_eq!(parse_date("2023-01-15 08:30", false), Some(ymd(2023, 1, 15)));
        assert_eq!(parse_date("15 January 2023", false), Some(ymd(2023, 1, 15)));
        assert_eq!(parse_date("Jan 15, 2023", false), Some(ymd(2023, 1, 15)));
        assert_eq!(parse_date("not a date", false), None);
        assert_eq!(parse_date("2023-02-30", false), None);
    }

    #[test]
    fn test_day_first_disambiguation() {
        assert_eq!(parse_date("01/02/2023", true), Some(ymd(2023, 2, 1)));
        assert_eq!(parse_date("01/02/2023", false), Some(ymd(2023, 1, 2)));
        assert_eq!(parse_date("15.01.23", true), Some(ymd(2023, 1, 15)));
        assert_eq!(parse_date("12-31-99", false), Some(ymd(1999, 12, 31)));
        // month 15 does not exist
        assert_eq!(parse_date("01/15/2023", true), None);
    }

    #[test]
    fn test_workbook_datetime_cells() {
        let dt = ymd(2023, 3, 4).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(coerce_date(&RawCell::DateTime(dt), false), Some(ymd(2023, 3, 4)));
        assert_eq!(passthrough(&RawCell::DateTime(dt)), Value::Date(ymd(2023, 3, 4)));

        let noon = ymd(2023, 3, 4).and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(passthrough(&RawCell::DateTime(noon)), Value::Text("2023-03-04 12:00:00".into()));
        assert_eq!(coerce_date(&RawCell::Number(45000.0), false), None);
    }

    #[test]
    fn test_coerce_table_counts_failures() {
        let vocab = Vocabulary {
            categorical: vec!["Class".into()],
            numeric: vec!["Price".into()],
            temporal: vec!["Order Date".into()],
            day_first: false,
        };
        let raw = table(
            &["Order Date", "Class", "Price", "Notes"],
            vec![
                vec![text("2023-01-15"), text("Truck"), text("250"), text("gift")],
                vec![text("soon"), RawCell::Number(7.0), text("n/a"), RawCell::Empty],
                vec![RawCell::Empty, RawCell::Empty, RawCell::Empty, RawCell::Number(1.5)],
            ],
        );

        let (ds, stats) = coerce(&raw, &vocab);

        assert_eq!(ds.column_names(), vec!["Order Date", "Class", "Price", "Notes"]);
        assert_eq!(ds.columns[3].kind, ColumnKind::Passthrough);
        assert_eq!(ds.records[0][0], Value::Date(ymd(2023, 1, 15)));
        assert_eq!(ds.records[0][2], Value::Number(250.0));
        assert_eq!(ds.records[1][0], Value::Missing);
        assert_eq!(ds.records[1][1], Value::Text("7".into()));
        assert_eq!(ds.records[1][2], Value::Missing);
        assert_eq!(ds.records[2][3], Value::Number(1.5));

        // empty cells are missing but not failures
        assert_eq!(stats.failures.get("Order Date"), Some(&1));
        assert_eq!(stats.failures.get("Price"), Some(&1));
        assert_eq!(stats.failures.get("Class"), None);
        assert_eq!(stats.total(), 2);
    }

    #[test]
    fn test_column_names_are_case_sensitive() {
        let vocab = Vocabulary {
            numeric: vec!["Sales".into()],
            ..Vocabulary::default()
        };
        let raw = table(&["sales"], vec![vec![text("10")]]);
        let (ds, _) = coerce(&raw, &vocab);
        assert_eq!(ds.columns[0].kind, ColumnKind::Passthrough);
        assert_eq!(ds.records[0][0], Value::Text("10".into()));
    }
}
