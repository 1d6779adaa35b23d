//! Domain models for the sheetdash pipeline.
//!
//! - [`RawCell`] - a cell as read from the upload, before coercion
//! - [`Value`] - a coerced cell (text, number, date, or missing)
//! - [`ColumnKind`] - how a column is coerced and used
//! - [`Dataset`] - ordered records over a fixed column schema
//! - [`MonthKey`] - a date truncated to its calendar month

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::{PipelineError, PipelineResult};

// =============================================================================
// Raw cells
// =============================================================================

/// A cell as produced by the readers.
///
/// CSV only ever yields `Empty` and `Text`; workbooks keep their typed cells.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl RawCell {
    /// Text cells that are empty count as empty.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            RawCell::Empty
        } else {
            RawCell::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RawCell::Empty)
    }
}

// =============================================================================
// Coerced values
// =============================================================================

/// A coerced cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Empty or unparseable cell.
    Missing,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Label used when the value acts as a category.
    ///
    /// Missing values have no label, so they never pass a filter constraint
    /// and never form a group.
    pub fn label(&self) -> Option<String> {
        match self {
            Value::Missing => None,
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Bool(b) => Some(b.to_string()),
        }
    }

    /// Plain text rendering for CSV export (missing renders empty).
    pub fn to_cell_string(&self) -> String {
        self.label().unwrap_or_default()
    }
}

/// Whole numbers render without a fraction so `3.0` and `"3"` match.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

// =============================================================================
// Months
// =============================================================================

/// A date truncated to its calendar month. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// =============================================================================
// Columns and datasets
// =============================================================================

/// How a column is coerced and used downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Categorical,
    Numeric,
    Temporal,
    /// Not in the dashboard vocabulary; carried through unmodified.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    /// Computed by a derived-field transform rather than read from the upload.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub derived: bool,
}

/// One row, aligned with [`Dataset::columns`].
pub type Record = Vec<Value>;

/// An ordered table with a fixed schema.
///
/// Column names are matched exactly and case-sensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<Column>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of a column a required computation depends on.
    pub fn require_column(&self, name: &str, context: &str) -> PipelineResult<usize> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::missing_column(name, context))
    }

    /// Values of one column in record order.
    pub fn values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.records.iter().map(move |r| &r[idx]))
    }

    /// Numeric values of a column, `None` for missing cells.
    pub fn numbers<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = Option<f64>> + 'a> {
        Some(self.values(name)?.map(Value::as_number))
    }

    /// Date values of a column, `None` for missing cells.
    pub fn dates<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = Option<NaiveDate>> + 'a> {
        Some(self.values(name)?.map(Value::as_date))
    }

    /// Distinct labels in the order they are first encountered.
    pub fn distinct_labels(&self, name: &str) -> Option<Vec<String>> {
        let mut seen = HashSet::new();
        let labels = self
            .values(name)?
            .filter_map(Value::label)
            .filter(|l| seen.insert(l.clone()))
            .collect();
        Some(labels)
    }

    /// Distinct calendar years of a date column, ascending.
    pub fn years(&self, name: &str) -> Option<Vec<i32>> {
        let years: BTreeSet<i32> = self.dates(name)?.flatten().map(|d| d.year()).collect();
        Some(years.into_iter().collect())
    }

    /// Append a column; `values` must hold one entry per record.
    pub fn push_column(&mut self, column: Column, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.records.len());
        self.columns.push(column);
        for (record, value) in self.records.iter_mut().zip(values) {
            record.push(value);
        }
    }

    /// Replace the column of the same name, or append it.
    pub fn upsert_column(&mut self, column: Column, values: Vec<Value>) {
        match self.column_index(&column.name) {
            Some(idx) => {
                debug_assert_eq!(values.len(), self.records.len());
                self.columns[idx] = column;
                for (record, value) in self.records.iter_mut().zip(values) {
                    record[idx] = value;
                }
            }
            None => self.push_column(column, values),
        }
    }

    /// Same schema, only the records for which `keep` returns true.
    pub fn retain_records(&self, mut keep: impl FnMut(&Record) -> bool) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }
}
