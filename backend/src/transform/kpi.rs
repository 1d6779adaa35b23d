//! Whole-dataset KPIs.

use serde::Serialize;

use crate::dashboard::{KpiKind, KpiSpec};
use crate::error::PipelineResult;
use crate::models::Dataset;

use super::aggregate::{mean, sum};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiValue {
    pub name: String,
    /// `None` when the statistic is undefined (mean of no values).
    pub value: Option<f64>,
}

/// Compute one KPI. An absent column is a
/// [`MissingRequiredColumn`](crate::error::PipelineError::MissingRequiredColumn).
pub fn compute_kpi(dataset: &Dataset, spec: &KpiSpec) -> PipelineResult<Option<f64>> {
    let context = format!("KPI '{}'", spec.name);

    let value = match &spec.kind {
        KpiKind::RowCount => Some(dataset.len() as f64),
        KpiKind::Sum { column } => Some(sum(&present_numbers(dataset, column, &context)?)),
        KpiKind::Mean { column } => mean(&present_numbers(dataset, column, &context)?),
        KpiKind::CountEqual { column, value } => {
            let idx = dataset.require_column(column, &context)?;
            let hits = dataset
                .records
                .iter()
                .filter(|r| r[idx].label().as_deref() == Some(value.as_str()))
                .count();
            Some(hits as f64)
        }
        KpiKind::DistinctCount { column } => {
            dataset.require_column(column, &context)?;
            let labels = dataset.distinct_labels(column).unwrap_or_default();
            Some(labels.len() as f64)
        }
        KpiKind::RatioOfSums { numerator, denominator, scale } => {
            let top = sum(&present_numbers(dataset, numerator, &context)?);
            let bottom = sum(&present_numbers(dataset, denominator, &context)?);
            if bottom == 0.0 {
                Some(0.0)
            } else {
                Some(top / bottom * scale)
            }
        }
    };

    Ok(value)
}

fn present_numbers(dataset: &Dataset, column: &str, context: &str) -> PipelineResult<Vec<f64>> {
    let idx = dataset.require_column(column, context)?;
    Ok(dataset.records.iter().filter_map(|r| r[idx].as_number()).collect())
}
