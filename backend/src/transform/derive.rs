//! Derived numeric fields.
//!
//! Fields are evaluated in order against each record, so a later field can
//! read an earlier one. A field whose source columns are absent is skipped
//! and its column is not added.

use serde::Serialize;

use crate::dashboard::{DerivedField, Expr};
use crate::models::{Column, ColumnKind, Dataset, Record, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedOutcome {
    /// Names of fields that were added or replaced.
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedDerived>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDerived {
    pub name: String,
    /// Source columns that were not in the dataset.
    pub missing: Vec<String>,
}

/// Add every applicable derived field to `dataset`.
pub fn apply_derived(dataset: &mut Dataset, fields: &[DerivedField]) -> DerivedOutcome {
    let mut outcome = DerivedOutcome::default();

    for field in fields {
        let missing: Vec<String> = field
            .expr
            .sources()
            .into_iter()
            .filter(|c| !dataset.has_column(c))
            .map(str::to_string)
            .collect();

        if !missing.is_empty() {
            outcome.skipped.push(SkippedDerived {
                name: field.name.clone(),
                missing,
            });
            continue;
        }

        let values: Vec<Value> = dataset
            .records
            .iter()
            .map(|record| {
                eval(&field.expr, dataset, record)
                    .map(Value::Number)
                    .unwrap_or(Value::Missing)
            })
            .collect();

        let column = Column {
            name: field.name.clone(),
            kind: ColumnKind::Numeric,
            derived: true,
        };
        dataset.upsert_column(column, values);
        outcome.applied.push(field.name.clone());
    }

    outcome
}

/// Evaluate `expr` for one record. `None` when any operand is missing.
pub fn eval(expr: &Expr, dataset: &Dataset, record: &Record) -> Option<f64> {
    match expr {
        Expr::Column { name } => {
            let idx = dataset.column_index(name)?;
            record.get(idx)?.as_number()
        }
        Expr::Constant { value } => Some(*value),
        Expr::Add { left, right } => Some(eval(left, dataset, record)? + eval(right, dataset, record)?),
        Expr::Sub { left, right } => Some(eval(left, dataset, record)? - eval(right, dataset, record)?),
        Expr::Mul { left, right } => Some(eval(left, dataset, record)? * eval(right, dataset, record)?),
        Expr::Div { left, right } => {
            let numerator = eval(left, dataset, record)?;
            let denominator = eval(right, dataset, record)?;
            if denominator == 0.0 {
                Some(0.0)
            } else {
                Some(numerator / denominator)
            }
        }
    }
}
