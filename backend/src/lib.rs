//! # Sheetdash - spreadsheet dashboard pipeline
//!
//! Sheetdash turns an uploaded CSV or workbook into the KPIs and aggregate
//! tables of a dashboard (HR analytics, sales performance, hobby-shop sales,
//! or any dashboard described by a JSON config).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │ CSV / xlsx  │──▶│   Parser    │──▶│   Coerce    │──▶│   Derive    │──▶│   Filter    │
//! │  (upload)   │   │  (auto-enc) │   │ (vocabulary)│   │  (fields)   │   │ (selection) │
//! └─────────────┘   └─────────────┘   └─────────────┘   └─────────────┘   └──────┬──────┘
//!                                                                               │
//!                                      ┌─────────────┐   ┌─────────────┐        │
//!                                      │   Report    │◀──│ KPIs+tables │◀───────┘
//!                                      │   (JSON)    │   │ (aggregate) │
//!                                      └─────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sheetdash::{build_report_file, DashboardConfig, FilterSelection};
//!
//! let config = DashboardConfig::preset("sales")?;
//! let report = build_report_file("orders.csv", &config, &FilterSelection::new())?;
//! println!("Total sales: {:?}", report.kpi("Total Sales"));
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells, values, columns and datasets
//! - [`parser`] - CSV and workbook ingestion with auto-detection
//! - [`dashboard`] - Dashboard configs and built-in presets
//! - [`transform`] - Coercion, derived fields, filtering, aggregation, pipeline
//! - [`export`] - CSV templates and record downloads
//! - [`validation`] - Dashboard config schema validation
//! - [`api`] - HTTP API server and log streaming

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Configuration
pub mod dashboard;

// Transformation
pub mod transform;

// Output
pub mod export;

// Validation
pub mod validation;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ConfigResult, IngestError, IngestResult, PipelineError, PipelineResult,
    ServerError, ServerResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Column, ColumnKind, Dataset, MonthKey, RawCell, Record, Value};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes, parse_file, RawTable,
    SourceFormat, SourceInfo,
};

// =============================================================================
// Re-exports - Dashboards
// =============================================================================

pub use dashboard::{
    DashboardConfig, DerivedField, Expr, GroupBy, KpiKind, KpiSpec, Measure, Statistic, TableSpec,
    Vocabulary,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{
    aggregate, apply_derived, build_report, build_report_file, build_report_from_table, coerce,
    compute_kpi, run_bytes, run_file, run_table, AggregateRow, AggregateTable, DashboardReport,
    FilterSelection, KpiValue, PipelineRun, SectionError,
};

// =============================================================================
// Re-exports - Export and validation
// =============================================================================

pub use export::{write_records, write_template};
pub use validation::{is_valid, validate, validate_dashboard_config};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, DashboardSummary, ReportResponse};

// Server
pub mod server {
    pub use crate::api::server::{start_server, ServerConfig};
}
