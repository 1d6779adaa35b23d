//! Grouped aggregation into named tables.
//!
//! # Grouping
//!
//! | GroupBy  | Keys                                   | Order              |
//! |----------|----------------------------------------|--------------------|
//! | `column` | distinct labels                        | first encountered  |
//! | `month`  | `YYYY-MM` of a date column             | chronological      |
//! | `bins`   | equal-width ranges over a number column | ascending          |
//! | `events` | `YYYY-MM` across several date columns  | chronological      |
//!
//! Records with a missing key are left out of every group. Each group is then
//! reduced by the table's measures, optionally sorted by one measure (stable)
//! and truncated. A `split_by` column repeats the measures once per label of
//! that column, so a histogram can show one count per gender.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::api::logs::log_warning;
use crate::dashboard::{EventSeries, GroupBy, Measure, Statistic, TableSpec};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{format_number, Dataset, MonthKey};

// =============================================================================
// Output
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub name: String,
    /// Heading of the key column.
    pub key: String,
    /// One heading per value column.
    pub columns: Vec<String>,
    pub rows: Vec<AggregateRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: String,
    /// `None` where a statistic has no values to work on.
    pub values: Vec<Option<f64>>,
}

impl AggregateTable {
    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == label)
    }

    /// Value of `label` for the row keyed `key`.
    pub fn get(&self, key: &str, label: &str) -> Option<f64> {
        let idx = self.column_index(label)?;
        self.rows.iter().find(|r| r.key == key)?.values[idx]
    }

    pub fn keys(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.key.as_str()).collect()
    }

    /// Sum of a value column over all rows.
    pub fn column_total(&self, label: &str) -> Option<f64> {
        let idx = self.column_index(label)?;
        Some(self.rows.iter().filter_map(|r| r.values[idx]).sum())
    }
}

/// Record indices sharing one key.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: String,
    pub rows: Vec<usize>,
}

// =============================================================================
// Entry point
// =============================================================================

/// Build one table. A column the table names that is absent from `dataset`
/// is a [`PipelineError::MissingRequiredColumn`]; the caller decides whether
/// that is reported or the table is dropped.
pub fn aggregate(dataset: &Dataset, spec: &TableSpec) -> PipelineResult<AggregateTable> {
    let context = format!("table '{}'", spec.name);

    let groups = match &spec.group_by {
        GroupBy::Column { column } => group_by_column(dataset, column, &context)?,
        GroupBy::Month { column } => group_by_month(dataset, column, &context)?,
        GroupBy::Bins { column, count } => group_by_bins(dataset, column, *count, &context)?,
        GroupBy::Events { series } => {
            let mut table = event_timeline(dataset, series, &context)?;
            table.name = spec.name.clone();
            return Ok(finish(table, spec));
        }
    };

    let default_measures = [Measure::count()];
    let measures: &[Measure] = if spec.measures.is_empty() {
        &default_measures
    } else {
        &spec.measures
    };

    let mut measure_columns = Vec::with_capacity(measures.len());
    for measure in measures {
        let idx = match &measure.column {
            Some(column) => Some(dataset.require_column(column, &context)?),
            None => None,
        };
        measure_columns.push(idx);
    }

    let splits = match &spec.split_by {
        Some(column) => {
            let idx = dataset.require_column(column, &context)?;
            Some((idx, dataset.distinct_labels(column).unwrap_or_default()))
        }
        None => None,
    };

    let reduce_all = |rows: &[usize]| -> Vec<Option<f64>> {
        measures
            .iter()
            .zip(&measure_columns)
            .map(|(measure, idx)| reduce(dataset, rows, measure, *idx))
            .collect()
    };

    let rows = groups
        .into_iter()
        .map(|group| {
            let values = match &splits {
                None => reduce_all(&group.rows),
                Some((idx, labels)) => labels
                    .iter()
                    .flat_map(|label| {
                        let rows: Vec<usize> = group
                            .rows
                            .iter()
                            .copied()
                            .filter(|&row| dataset.records[row][*idx].label().as_deref() == Some(label.as_str()))
                            .collect();
                        reduce_all(&rows)
                    })
                    .collect(),
            };
            AggregateRow {
                key: group.key,
                values,
            }
        })
        .collect();

    let measure_labels: Vec<String> = measures.iter().map(Measure::output_label).collect();
    let columns = match &splits {
        None => measure_labels,
        // one measure: the split label alone names the column
        Some((_, labels)) if measure_labels.len() == 1 => labels.clone(),
        Some((_, labels)) => labels
            .iter()
            .flat_map(|label| measure_labels.iter().map(move |m| format!("{} {}", label, m)))
            .collect(),
    };

    let table = AggregateTable {
        name: spec.name.clone(),
        key: spec.group_by.key_label(),
        columns,
        rows,
    };
    Ok(finish(table, spec))
}

fn finish(mut table: AggregateTable, spec: &TableSpec) -> AggregateTable {
    if let Some(sort) = &spec.sort {
        if let Some(idx) = table.column_index(&sort.by) {
            table
                .rows
                .sort_by(|a, b| compare_values(a.values[idx], b.values[idx], sort.descending));
        }
    }
    if let Some(limit) = spec.limit {
        table.rows.truncate(limit);
    }
    table
}

/// Missing values sort last in both directions.
fn compare_values(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// =============================================================================
// Grouping
// =============================================================================

/// Group by label, first-encountered order.
pub fn group_by_column(dataset: &Dataset, column: &str, context: &str) -> PipelineResult<Vec<Group>> {
    let idx = dataset.require_column(column, context)?;
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for (row, record) in dataset.records.iter().enumerate() {
        let Some(label) = record[idx].label() else {
            continue;
        };
        match positions.get(&label) {
            Some(&pos) => groups[pos].rows.push(row),
            None => {
                positions.insert(label.clone(), groups.len());
                groups.push(Group { key: label, rows: vec![row] });
            }
        }
    }

    Ok(groups)
}

/// Group by calendar month, chronological. Records without a date are dropped.
pub fn group_by_month(dataset: &Dataset, column: &str, context: &str) -> PipelineResult<Vec<Group>> {
    let idx = dataset.require_column(column, context)?;
    let mut months: BTreeMap<MonthKey, Vec<usize>> = BTreeMap::new();

    for (row, record) in dataset.records.iter().enumerate() {
        if let Some(date) = record[idx].as_date() {
            months.entry(MonthKey::of(date)).or_default().push(row);
        }
    }

    Ok(months
        .into_iter()
        .map(|(month, rows)| Group { key: month.to_string(), rows })
        .collect())
}

/// Split the column's range into `count` equal-width bins. The maximum falls
/// in the last bin; empty bins are kept.
pub fn group_by_bins(
    dataset: &Dataset,
    column: &str,
    count: usize,
    context: &str,
) -> PipelineResult<Vec<Group>> {
    let idx = dataset.require_column(column, context)?;
    let present: Vec<(usize, f64)> = dataset
        .records
        .iter()
        .enumerate()
        .filter_map(|(row, record)| record[idx].as_number().map(|n| (row, n)))
        .collect();

    if present.is_empty() || count == 0 {
        return Ok(Vec::new());
    }

    let min = present.iter().map(|(_, n)| *n).fold(f64::INFINITY, f64::min);
    let max = present.iter().map(|(_, n)| *n).fold(f64::NEG_INFINITY, f64::max);

    if min == max {
        let rows = present.into_iter().map(|(row, _)| row).collect();
        return Ok(vec![Group { key: bin_label(min, max, true), rows }]);
    }

    // labels and membership share these edges
    let edge = |i: usize| {
        if i == count {
            max
        } else {
            min + (max - min) * i as f64 / count as f64
        }
    };
    let mut groups: Vec<Group> = (0..count)
        .map(|i| Group { key: bin_label(edge(i), edge(i + 1), i + 1 == count), rows: Vec::new() })
        .collect();

    for (row, n) in present {
        let mut bin = (((n - min) / (max - min) * count as f64).floor() as usize).min(count - 1);
        while bin + 1 < count && n >= edge(bin + 1) {
            bin += 1;
        }
        while bin > 0 && n < edge(bin) {
            bin -= 1;
        }
        groups[bin].rows.push(row);
    }

    Ok(groups)
}

fn bin_label(lo: f64, hi: f64, closed: bool) -> String {
    let round = |x: f64| format_number((x * 100.0).round() / 100.0);
    if closed {
        format!("[{}, {}]", round(lo), round(hi))
    } else {
        format!("[{}, {})", round(lo), round(hi))
    }
}

/// Per-month event counts, one value column per series, outer-joined on month
/// with gaps filled by zero. Series whose column is absent are left out; an
/// error is raised only when none is present.
pub fn event_timeline(
    dataset: &Dataset,
    series: &[EventSeries],
    context: &str,
) -> PipelineResult<AggregateTable> {
    let mut present = Vec::new();
    let mut first_missing = None;
    for s in series {
        match dataset.column_index(&s.column) {
            Some(idx) => present.push((s, idx)),
            None => {
                log_warning(format!("{}: no '{}' column, '{}' left out", context, s.column, s.label));
                first_missing.get_or_insert(s.column.as_str());
            }
        }
    }

    if present.is_empty() {
        let column = first_missing.unwrap_or_default();
        return Err(PipelineError::missing_column(column, context));
    }

    let mut counts: BTreeMap<MonthKey, Vec<f64>> = BTreeMap::new();
    for (i, (_, idx)) in present.iter().enumerate() {
        let dates = dataset.records.iter().filter_map(|r| r[*idx].as_date());
        for date in dates {
            counts.entry(MonthKey::of(date)).or_insert_with(|| vec![0.0; present.len()])[i] += 1.0;
        }
    }

    Ok(AggregateTable {
        name: String::new(),
        key: "Month".to_string(),
        columns: present.iter().map(|(s, _)| s.label.clone()).collect(),
        rows: counts
            .into_iter()
            .map(|(month, values)| AggregateRow {
                key: month.to_string(),
                values: values.into_iter().map(Some).collect(),
            })
            .collect(),
    })
}

// =============================================================================
// Statistics
// =============================================================================

fn reduce(dataset: &Dataset, rows: &[usize], measure: &Measure, column: Option<usize>) -> Option<f64> {
    let Some(idx) = column else {
        return Some(rows.len() as f64);
    };
    if measure.stat == Statistic::Count {
        let present = rows.iter().filter(|&&row| !dataset.records[row][idx].is_missing());
        return Some(present.count() as f64);
    }

    let values: Vec<f64> = rows
        .iter()
        .filter_map(|&row| dataset.records[row][idx].as_number())
        .collect();

    match measure.stat {
        Statistic::Count => Some(values.len() as f64),
        Statistic::Sum => Some(sum(&values)),
        Statistic::Mean => mean(&values),
        Statistic::Min => values.iter().copied().reduce(f64::min),
        Statistic::Max => values.iter().copied().reduce(f64::max),
        Statistic::Median => quantile(&values, 0.5),
        Statistic::Quantile => quantile(&values, measure.q.unwrap_or(0.5)),
    }
}

pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(sum(values) / values.len() as f64)
    }
}

/// Linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{presets, SortSpec};
    use crate::models::{Column, ColumnKind, Value};
    use chrono::NaiveDate;

    fn date(s: &str) -> Value {
        Value::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    fn sales() -> Dataset {
        let columns = vec![
            Column { name: "Order Date".into(), kind: ColumnKind::Temporal, derived: false },
            Column { name: "Region".into(), kind: ColumnKind::Categorical, derived: false },
            Column { name: "Sales".into(), kind: ColumnKind::Numeric, derived: false },
        ];
        let records = vec![
            vec![date("2023-03-02"), text("West"), Value::Number(100.0)],
            vec![date("2023-01-15"), text("East"), Value::Number(240.0)],
            vec![Value::Missing, text("West"), Value::Number(60.0)],
            vec![date("2023-01-20"), Value::Missing, Value::Missing],
            vec![date("2022-12-31"), text("North"), Value::Number(10.0)],
        ];
        Dataset::new(columns, records)
    }

    fn spec(name: &str, group_by: GroupBy, measures: Vec<Measure>) -> TableSpec {
        TableSpec {
            name: name.into(),
            group_by,
            measures,
            required: false,
            split_by: None,
            sort: None,
            limit: None,
        }
    }

    fn by(column: &str) -> GroupBy {
        GroupBy::Column { column: column.into() }
    }

    #[test]
    fn test_group_sums_equal_total() {
        let ds = sales();
        let table = aggregate(&ds, &spec("t", by("Region"), vec![Measure::of(Statistic::Sum, "Sales")])).unwrap();

        assert_eq!(table.keys(), vec!["West", "East", "North"]);
        assert_eq!(table.get("West", "Sales"), Some(160.0));
        // the record with no region has no sales either
        let total: f64 = ds.numbers("Sales").unwrap().flatten().sum();
        assert_eq!(table.column_total("Sales"), Some(total));
    }

    #[test]
    fn test_missing_key_sales_left_out_of_groups() {
        let mut ds = sales();
        ds.records[3][2] = Value::Number(40.0);
        let table = aggregate(&ds, &spec("t", by("Region"), vec![Measure::of(Statistic::Sum, "Sales")])).unwrap();

        assert_eq!(table.keys(), vec!["West", "East", "North"]);
        let total: f64 = ds.numbers("Sales").unwrap().flatten().sum();
        assert_eq!(total, 450.0);
        // the row without a region belongs to no group
        assert_eq!(table.column_total("Sales"), Some(410.0));
    }

    #[test]
    fn test_months_chronological_regardless_of_input_order() {
        let table = aggregate(
            &sales(),
            &spec("t", GroupBy::Month { column: "Order Date".into() }, vec![Measure::of(Statistic::Sum, "Sales")]),
        )
        .unwrap();
        assert_eq!(table.keys(), vec!["2022-12", "2023-01", "2023-03"]);
        // missing Sales skipped, month still present
        assert_eq!(table.get("2023-01", "Sales"), Some(240.0));
    }

    #[test]
    fn test_mean_excludes_missing() {
        let mut ds = sales();
        ds.records[3][1] = text("East");
        let table = aggregate(&ds, &spec("t", by("Region"), vec![Measure::of(Statistic::Mean, "Sales")])).unwrap();
        assert_eq!(table.get("East", "Sales mean"), Some(240.0));

        let counts = aggregate(&ds, &spec("t", by("Region"), vec![])).unwrap();
        assert_eq!(counts.columns, vec!["Count"]);
        assert_eq!(counts.get("East", "Count"), Some(2.0));
    }

    #[test]
    fn test_missing_column_is_error() {
        let err = aggregate(&sales(), &spec("t", by("Category"), vec![])).unwrap_err();
        assert!(err.to_string().contains("Category"));
        let err = aggregate(&sales(), &spec("t", by("Region"), vec![Measure::of(Statistic::Sum, "Profit")]))
            .unwrap_err();
        assert!(err.to_string().contains("Profit"));
    }

    #[test]
    fn test_sort_and_limit() {
        let mut table_spec = spec("Top", by("Region"), vec![Measure::of(Statistic::Sum, "Sales")]);
        table_spec.sort = Some(SortSpec { by: "Sales".into(), descending: true });
        table_spec.limit = Some(2);
        let table = aggregate(&sales(), &table_spec).unwrap();
        assert_eq!(table.keys(), vec!["East", "West"]);
    }

    #[test]
    fn test_quantiles_interpolate() {
        let values = [50000.0, 60000.0, 75000.0, 90000.0];
        assert_eq!(quantile(&values, 0.5), Some(67500.0));
        assert_eq!(quantile(&values, 0.25), Some(57500.0));
        assert_eq!(quantile(&values, 0.0), Some(50000.0));
        assert_eq!(quantile(&values, 1.0), Some(90000.0));
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_bins_cover_range() {
        let columns = vec![Column { name: "Age".into(), kind: ColumnKind::Numeric, derived: false }];
        let records = [20.0, 25.0, 39.0, 60.0].iter().map(|n| vec![Value::Number(*n)]).collect();
        let ds = Dataset::new(columns, records);

        let groups = group_by_bins(&ds, "Age", 4, "test").unwrap();
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0].key, "[20, 30)");
        assert_eq!(groups[0].rows, vec![0, 1]);
        assert_eq!(groups[1].rows, vec![2]);
        assert!(groups[2].rows.is_empty());
        assert_eq!(groups[3].key, "[50, 60]");
        assert_eq!(groups[3].rows, vec![3]);
    }

    #[test]
    fn test_values_on_fractional_edges_open_their_bin() {
        let columns = vec![Column { name: "X".into(), kind: ColumnKind::Numeric, derived: false }];
        let records = [0.0, 0.3, 0.6, 0.7, 1.0].iter().map(|n| vec![Value::Number(*n)]).collect();
        let ds = Dataset::new(columns, records);

        let groups = group_by_bins(&ds, "X", 10, "test").unwrap();
        assert_eq!(groups.len(), 10);
        assert_eq!(groups[0].rows, vec![0]);
        assert!(groups[2].rows.is_empty());
        assert_eq!(groups[3].key, "[0.3, 0.4)");
        assert_eq!(groups[3].rows, vec![1]);
        assert!(groups[5].rows.is_empty());
        assert_eq!(groups[6].key, "[0.6, 0.7)");
        assert_eq!(groups[6].rows, vec![2]);
        assert_eq!(groups[7].key, "[0.7, 0.8)");
        assert_eq!(groups[7].rows, vec![3]);
        assert_eq!(groups[9].key, "[0.9, 1]");
        assert_eq!(groups[9].rows, vec![4]);
    }

    #[test]
    fn test_split_by_repeats_measures_per_label() {
        let columns = vec![
            Column { name: "Age".into(), kind: ColumnKind::Numeric, derived: false },
            Column { name: "Gender".into(), kind: ColumnKind::Categorical, derived: false },
        ];
        let records = vec![
            vec![Value::Number(20.0), text("F")],
            vec![Value::Number(25.0), text("M")],
            vec![Value::Number(28.0), text("F")],
            vec![Value::Number(60.0), text("M")],
            vec![Value::Number(50.0), Value::Missing],
        ];
        let ds = Dataset::new(columns, records);

        let hr = presets::hr();
        let ages = hr.tables.iter().find(|t| t.name == "Age Distribution").unwrap();
        let mut ages = ages.clone();
        if let GroupBy::Bins { count, .. } = &mut ages.group_by {
            *count = 4;
        }
        let table = aggregate(&ds, &ages).unwrap();

        assert_eq!(table.columns, vec!["F", "M"]);
        assert_eq!(table.get("[20, 30)", "F"), Some(2.0));
        assert_eq!(table.get("[20, 30)", "M"), Some(1.0));
        // 50 has no gender, so only 60 is counted
        assert_eq!(table.get("[50, 60]", "M"), Some(1.0));
        assert_eq!(table.get("[50, 60]", "F"), Some(0.0));
        assert_eq!(table.get("[40, 50)", "F"), Some(0.0));

        let mut two = spec("t", by("Gender"), vec![Measure::count(), Measure::of(Statistic::Max, "Age")]);
        two.split_by = Some("Gender".into());
        let table = aggregate(&ds, &two).unwrap();
        assert_eq!(table.columns, vec!["F Count", "F Age max", "M Count", "M Age max"]);
        assert_eq!(table.get("M", "M Age max"), Some(60.0));
        assert_eq!(table.get("M", "F Count"), Some(0.0));
    }

    #[test]
    fn test_split_by_absent_column_is_error() {
        let mut table_spec = spec("t", by("Region"), vec![]);
        table_spec.split_by = Some("Segment".into());
        let err = aggregate(&sales(), &table_spec).unwrap_err();
        assert!(err.to_string().contains("Segment"));
    }

    #[test]
    fn test_single_value_makes_one_bin() {
        let columns = vec![Column { name: "Age".into(), kind: ColumnKind::Numeric, derived: false }];
        let ds = Dataset::new(columns, vec![vec![Value::Number(30.0)], vec![Value::Number(30.0)]]);
        let groups = group_by_bins(&ds, "Age", 10, "test").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rows.len(), 2);
    }

    #[test]
    fn test_hires_vs_exits_outer_join() {
        let columns = vec![
            Column { name: "HireDate".into(), kind: ColumnKind::Temporal, derived: false },
            Column { name: "ExitDate".into(), kind: ColumnKind::Temporal, derived: false },
        ];
        let records = vec![
            vec![date("2019-01-10"), Value::Missing],
            vec![date("2018-03-15"), date("2022-05-01")],
            vec![date("2019-01-23"), Value::Missing],
        ];
        let ds = Dataset::new(columns, records);

        let hr = presets::hr();
        let hires_exits = hr.tables.iter().find(|t| t.name == "Hires vs Exits").unwrap();
        let table = aggregate(&ds, hires_exits).unwrap();

        assert_eq!(table.columns, vec!["Hires", "Exits"]);
        assert_eq!(table.keys(), vec!["2018-03", "2019-01", "2022-05"]);
        assert_eq!(table.get("2019-01", "Hires"), Some(2.0));
        assert_eq!(table.get("2019-01", "Exits"), Some(0.0));
        assert_eq!(table.get("2022-05", "Exits"), Some(1.0));
    }

    #[test]
    fn test_events_without_any_column_is_error() {
        let hr = presets::hr();
        let hires_exits = hr.tables.iter().find(|t| t.name == "Hires vs Exits").unwrap();
        assert!(aggregate(&sales(), hires_exits).is_err());
    }
}
