//! Transformation module.
//!
//! Each stage is a plain function over a [`crate::models::Dataset`]:
//! - Coerce: raw cells to typed values
//! - Derive: computed numeric fields
//! - Filter: per-column allowed values
//! - Aggregate: grouped tables
//! - KPI: whole-dataset scalars
//! - Pipeline: all of the above for one upload

pub mod aggregate;
pub mod coerce;
pub mod derive;
pub mod filter;
pub mod kpi;
pub mod pipeline;

pub use aggregate::{aggregate, AggregateRow, AggregateTable};
pub use coerce::{coerce, CoercionStats};
pub use derive::{apply_derived, DerivedOutcome, SkippedDerived};
pub use filter::FilterSelection;
pub use kpi::{compute_kpi, KpiValue};
pub use pipeline::*;
