//! Dashboard definitions.
//!
//! A [`DashboardConfig`] names the column vocabulary of one dashboard
//! variant, the derived fields to compute, the filters to offer, and the
//! KPIs and aggregate tables to produce. The pipeline is the same for every
//! dashboard; only this configuration changes.
//!
//! Configs come from the built-in [`presets`] or from JSON files, which are
//! checked against `schemas/dashboard-config.json` before deserialization.
//!
//! ```json
//! {
//!   "name": "hobby",
//!   "vocabulary": { "categorical": ["Class"], "numeric": ["Price", "Quantity"] },
//!   "derived": [
//!     { "name": "Amount Collected",
//!       "expr": { "op": "mul", "left": { "op": "column", "name": "Price" },
//!                              "right": { "op": "column", "name": "Quantity" } } }
//!   ],
//!   "kpis": [ { "name": "Total Sales", "type": "sum", "column": "Amount Collected" } ],
//!   "tables": [
//!     { "name": "Sales by Class", "groupBy": { "type": "column", "column": "Class" },
//!       "measures": [ { "stat": "sum", "column": "Amount Collected" } ] }
//!   ]
//! }
//! ```

pub mod presets;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::models::ColumnKind;
use crate::validation::validate_dashboard_config;

// =============================================================================
// Top-level config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    /// Short identifier (`hr`, `sales`, ...).
    pub name: String,

    #[serde(default)]
    pub title: String,

    pub vocabulary: Vocabulary,

    /// Applied in order; later fields may use earlier ones.
    #[serde(default)]
    pub derived: Vec<DerivedField>,

    /// Categorical columns offered as multi-select filters.
    #[serde(default)]
    pub filters: Vec<String>,

    /// Temporal column offered as a year selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_filter: Option<String>,

    #[serde(default)]
    pub kpis: Vec<KpiSpec>,

    #[serde(default)]
    pub tables: Vec<TableSpec>,

    /// Sample rows for the downloadable template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Template>,
}

/// Which columns get which coercion. Unlisted columns pass through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vocabulary {
    #[serde(default)]
    pub categorical: Vec<String>,
    #[serde(default)]
    pub numeric: Vec<String>,
    #[serde(default)]
    pub temporal: Vec<String>,
    /// Read ambiguous `01/02/2023` as 1 February.
    #[serde(default)]
    pub day_first: bool,
}

impl Vocabulary {
    pub fn kind_of(&self, column: &str) -> ColumnKind {
        if self.numeric.iter().any(|c| c == column) {
            ColumnKind::Numeric
        } else if self.temporal.iter().any(|c| c == column) {
            ColumnKind::Temporal
        } else if self.categorical.iter().any(|c| c == column) {
            ColumnKind::Categorical
        } else {
            ColumnKind::Passthrough
        }
    }

    /// All vocabulary columns: categorical, then numeric, then temporal.
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.categorical
            .iter()
            .chain(self.numeric.iter())
            .chain(self.temporal.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

// =============================================================================
// Derived fields
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedField {
    pub name: String,
    pub expr: Expr,
}

/// Arithmetic over numeric columns.
///
/// A missing operand makes the result missing. Division by zero yields zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Column { name: String },
    Constant { value: f64 },
    Add { left: Box<Expr>, right: Box<Expr> },
    Sub { left: Box<Expr>, right: Box<Expr> },
    Mul { left: Box<Expr>, right: Box<Expr> },
    Div { left: Box<Expr>, right: Box<Expr> },
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column { name: name.into() }
    }

    pub fn constant(value: f64) -> Self {
        Expr::Constant { value }
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Expr::Add { left: Box::new(left), right: Box::new(right) }
    }

    pub fn sub(left: Expr, right: Expr) -> Self {
        Expr::Sub { left: Box::new(left), right: Box::new(right) }
    }

    pub fn mul(left: Expr, right: Expr) -> Self {
        Expr::Mul { left: Box::new(left), right: Box::new(right) }
    }

    pub fn div(left: Expr, right: Expr) -> Self {
        Expr::Div { left: Box::new(left), right: Box::new(right) }
    }

    /// Columns this expression reads, deduplicated, in first-use order.
    pub fn sources(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_sources(&mut out);
        out
    }

    fn collect_sources<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column { name } => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Constant { .. } => {}
            Expr::Add { left, right }
            | Expr::Sub { left, right }
            | Expr::Mul { left, right }
            | Expr::Div { left, right } => {
                left.collect_sources(out);
                right.collect_sources(out);
            }
        }
    }
}

// =============================================================================
// KPIs
// =============================================================================

/// A whole-dataset scalar summary. Every column a KPI names is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: KpiKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KpiKind {
    /// Number of records.
    RowCount,
    /// Sum of a numeric column, missing cells skipped.
    Sum { column: String },
    /// Mean of a numeric column, missing cells excluded from both sides.
    Mean { column: String },
    /// Records whose label in `column` equals `value`.
    CountEqual { column: String, value: String },
    /// Distinct non-missing labels in `column`.
    DistinctCount { column: String },
    /// `sum(numerator) / sum(denominator) * scale`, zero when the denominator sums to zero.
    RatioOfSums {
        numerator: String,
        denominator: String,
        #[serde(default = "default_scale")]
        scale: f64,
    },
}

fn default_scale() -> f64 {
    1.0
}

impl KpiKind {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            KpiKind::RowCount => vec![],
            KpiKind::Sum { column }
            | KpiKind::Mean { column }
            | KpiKind::CountEqual { column, .. }
            | KpiKind::DistinctCount { column } => vec![column.as_str()],
            KpiKind::RatioOfSums { numerator, denominator, .. } => {
                vec![numerator.as_str(), denominator.as_str()]
            }
        }
    }
}

// =============================================================================
// Aggregate tables
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    pub name: String,
    pub group_by: GroupBy,
    /// Defaults to a single row count when empty.
    #[serde(default)]
    pub measures: Vec<Measure>,
    /// A required table reports a missing column as an error; an optional
    /// one is silently omitted.
    #[serde(default)]
    pub required: bool,
    /// Second grouping: every measure is repeated once per label of this
    /// column, in first-encountered order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupBy {
    /// Distinct labels, first-encountered order.
    Column { column: String },
    /// Calendar month of a date column, chronological order.
    Month { column: String },
    /// Equal-width bins over a numeric column's range, ascending.
    Bins { column: String, count: usize },
    /// Per-month event counts from several date columns, gaps filled with zero.
    Events { series: Vec<EventSeries> },
}

impl GroupBy {
    pub fn key_label(&self) -> String {
        match self {
            GroupBy::Column { column } | GroupBy::Month { column } | GroupBy::Bins { column, .. } => {
                column.clone()
            }
            GroupBy::Events { .. } => "Month".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSeries {
    pub label: String,
    pub column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    Median,
    Quantile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub stat: Statistic,
    /// Omitted only for a plain row count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Quantile in `[0, 1]` for [`Statistic::Quantile`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Measure {
    pub fn count() -> Self {
        Self { stat: Statistic::Count, column: None, q: None, label: None }
    }

    pub fn of(stat: Statistic, column: impl Into<String>) -> Self {
        Self { stat, column: Some(column.into()), q: None, label: None }
    }

    pub fn quantile(column: impl Into<String>, q: f64) -> Self {
        Self { stat: Statistic::Quantile, column: Some(column.into()), q: Some(q), label: None }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Output column name.
    pub fn output_label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match (&self.column, self.stat) {
            (None, _) => "Count".to_string(),
            (Some(col), Statistic::Sum) => col.clone(),
            (Some(col), Statistic::Quantile) => {
                format!("{} p{}", col, (self.q.unwrap_or(0.5) * 100.0).round())
            }
            (Some(col), stat) => format!("{} {}", col, stat.as_str()),
        }
    }
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::Sum => "sum",
            Statistic::Mean => "mean",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Median => "median",
            Statistic::Quantile => "quantile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Output label of the measure to sort by.
    pub by: String,
    #[serde(default = "default_descending")]
    pub descending: bool,
}

fn default_descending() -> bool {
    true
}

// =============================================================================
// Loading
// =============================================================================

impl DashboardConfig {
    /// Built-in dashboard by name.
    pub fn preset(name: &str) -> ConfigResult<Self> {
        presets::by_name(name).ok_or_else(|| ConfigError::UnknownDashboard(name.to_string()))
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: JsonValue) -> ConfigResult<Self> {
        validate_dashboard_config(&value).map_err(|errors| ConfigError::Schema { errors })?;
        let config: DashboardConfig = serde_json::from_value(value)?;
        config.check()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// A preset name, or else a path to a JSON config.
    pub fn resolve(name_or_path: &str) -> ConfigResult<Self> {
        if let Some(config) = presets::by_name(name_or_path) {
            return Ok(config);
        }
        let path = Path::new(name_or_path);
        if path.is_file() {
            return Self::load(path);
        }
        Err(ConfigError::UnknownDashboard(name_or_path.to_string()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Checks the schema cannot express.
    pub fn check(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("dashboard name is empty".into()));
        }

        let mut derived_names = HashSet::new();
        for field in &self.derived {
            if !derived_names.insert(field.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "derived field '{}' defined twice",
                    field.name
                )));
            }
        }

        for table in &self.tables {
            for measure in &table.measures {
                if measure.column.is_none() && measure.stat != Statistic::Count {
                    return Err(ConfigError::Invalid(format!(
                        "table '{}': {} measure needs a column",
                        table.name,
                        measure.stat.as_str()
                    )));
                }
                if measure.stat == Statistic::Quantile
                    && !measure.q.is_some_and(|q| (0.0..=1.0).contains(&q))
                {
                    return Err(ConfigError::Invalid(format!(
                        "table '{}': quantile needs q in [0, 1]",
                        table.name
                    )));
                }
            }
            if let GroupBy::Bins { count: 0, .. } = table.group_by {
                return Err(ConfigError::Invalid(format!(
                    "table '{}': bin count must be positive",
                    table.name
                )));
            }
            if table.split_by.is_some() && matches!(table.group_by, GroupBy::Events { .. }) {
                return Err(ConfigError::Invalid(format!(
                    "table '{}': events tables cannot be split",
                    table.name
                )));
            }
            if let Some(sort) = table.sort.as_ref().filter(|_| table.split_by.is_none()) {
                let labels: Vec<String> = table.measures.iter().map(Measure::output_label).collect();
                if !labels.contains(&sort.by) {
                    return Err(ConfigError::Invalid(format!(
                        "table '{}': cannot sort by unknown measure '{}'",
                        table.name, sort.by
                    )));
                }
            }
        }

        Ok(())
    }
}
