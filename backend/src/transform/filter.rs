//! Record filtering by categorical values and calendar years.
//!
//! A record passes when, for every constrained column, its label is in that
//! column's allowed set. Missing values have no label and never pass. Order is
//! preserved, so filtering is idempotent and narrowing a selection can only
//! remove records.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::PipelineResult;
use crate::models::Dataset;

/// Allowed values per column.
///
/// A column with no entry is unconstrained. A column mapped to an empty set
/// passes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    #[serde(default)]
    pub values: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub years: BTreeMap<String, BTreeSet<i32>>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `column` to `values`.
    pub fn allow<I, S>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values
            .insert(column.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict the date column `column` to calendar `years`.
    pub fn allow_years(mut self, column: impl Into<String>, years: impl IntoIterator<Item = i32>) -> Self {
        self.years.insert(column.into(), years.into_iter().collect());
        self
    }

    /// Every observed label of each present column. Applying it keeps every
    /// record that has a value in all of those columns.
    pub fn all_observed(dataset: &Dataset, columns: &[String]) -> Self {
        let mut selection = Self::new();
        for column in columns {
            if let Some(labels) = dataset.distinct_labels(column) {
                selection = selection.allow(column.clone(), labels);
            }
        }
        selection
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.years.is_empty()
    }

    /// Filter `dataset`. A constraint on an absent column is an error.
    pub fn apply(&self, dataset: &Dataset) -> PipelineResult<Dataset> {
        let value_constraints = self
            .values
            .iter()
            .map(|(column, allowed)| Ok((dataset.require_column(column, "filter")?, allowed)))
            .collect::<PipelineResult<Vec<_>>>()?;

        let year_constraints = self
            .years
            .iter()
            .map(|(column, allowed)| Ok((dataset.require_column(column, "year filter")?, allowed)))
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(dataset.retain_records(|record| {
            value_constraints.iter().all(|(idx, allowed)| {
                record[*idx].label().is_some_and(|label| allowed.contains(&label))
            }) && year_constraints.iter().all(|(idx, allowed)| {
                record[*idx].as_date().is_some_and(|d| allowed.contains(&d.year()))
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::models::{Column, ColumnKind, Value};
    use chrono::NaiveDate;

    fn hr() -> Dataset {
        let columns = vec![
            Column { name: "Department".into(), kind: ColumnKind::Categorical, derived: false },
            Column { name: "Gender".into(), kind: ColumnKind::Categorical, derived: false },
            Column { name: "HireDate".into(), kind: ColumnKind::Temporal, derived: false },
        ];
        let date = |y, m, d| Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap());
        let records = vec![
            vec![Value::Text("HR".into()), Value::Text("F".into()), date(2019, 1, 10)],
            vec![Value::Text("IT".into()), Value::Text("M".into()), date(2018, 3, 15)],
            vec![Value::Text("Finance".into()), Value::Text("M".into()), date(2015, 7, 23)],
        ];
        Dataset::new(columns, records)
    }

    fn departments(ds: &Dataset) -> Vec<String> {
        ds.values("Department").unwrap().filter_map(Value::label).collect()
    }

    #[test]
    fn test_department_and_gender() {
        let ds = hr();
        let selection = FilterSelection::new()
            .allow("Department", ["IT", "Finance"])
            .allow("Gender", ["M"]);
        let filtered = selection.apply(&ds).unwrap();
        assert_eq!(departments(&filtered), vec!["IT", "Finance"]);
    }

    #[test]
    fn test_all_observed_keeps_everything() {
        let ds = hr();
        let selection =
            FilterSelection::all_observed(&ds, &["Department".into(), "Gender".into()]);
        assert_eq!(selection.apply(&ds).unwrap(), ds);
    }

    #[test]
    fn test_idempotent() {
        let ds = hr();
        let selection = FilterSelection::new().allow("Gender", ["M"]);
        let once = selection.apply(&ds).unwrap();
        let twice = selection.apply(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_narrowing_is_monotonic() {
        let ds = hr();
        let wide = FilterSelection::new().allow("Department", ["HR", "IT", "Finance"]);
        let narrow = FilterSelection::new().allow("Department", ["IT"]);
        let wide_rows = wide.apply(&ds).unwrap();
        let narrow_rows = narrow.apply(&ds).unwrap();
        assert!(narrow_rows.len() <= wide_rows.len());
        for record in &narrow_rows.records {
            assert!(wide_rows.records.contains(record));
        }
    }

    #[test]
    fn test_empty_allowed_set_passes_nothing() {
        let ds = hr();
        let selection = FilterSelection::new().allow("Department", Vec::<String>::new());
        assert!(selection.apply(&ds).unwrap().is_empty());
    }

    #[test]
    fn test_missing_values_never_pass() {
        let mut ds = hr();
        ds.records[0][0] = Value::Missing;
        let selection = FilterSelection::all_observed(&ds, &["Department".into()]);
        assert_eq!(departments(&selection.apply(&ds).unwrap()), vec!["IT", "Finance"]);
    }

    #[test]
    fn test_absent_column_is_error() {
        let ds = hr();
        let err = FilterSelection::new().allow("Region", ["East"]).apply(&ds).unwrap_err();
        assert!(matches!(err, PipelineError::MissingRequiredColumn { ref column, .. } if column == "Region"));
    }

    #[test]
    fn test_year_filter() {
        let ds = hr();
        let selection = FilterSelection::new().allow_years("HireDate", [2018, 2019]);
        assert_eq!(departments(&selection.apply(&ds).unwrap()), vec!["HR", "IT"]);
    }

    #[test]
    fn test_selection_from_json() {
        let selection: FilterSelection =
            serde_json::from_value(serde_json::json!({ "values": { "Gender": ["F"] } })).unwrap();
        assert_eq!(departments(&selection.apply(&hr()).unwrap()), vec!["HR"]);
    }
}
