//! REST API types.
//!
//! The report is sent as-is; the presentation layer reads tables and KPIs
//! straight from it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dashboard::DashboardConfig;
use crate::transform::pipeline::DashboardReport;

/// Response sent after an upload has been turned into a report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    /// Unique identifier for this computation
    pub report_id: String,

    /// Status: "ready", "warning" (some sections failed), "error"
    pub status: String,

    pub report: DashboardReport,
}

impl From<DashboardReport> for ReportResponse {
    fn from(report: DashboardReport) -> Self {
        ReportResponse {
            report_id: Uuid::new_v4().to_string(),
            status: if report.is_complete() { "ready" } else { "warning" }.to_string(),
            report,
        }
    }
}

/// One entry of the dashboard listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub name: String,
    pub title: String,
    pub filters: Vec<String>,
    pub kpis: Vec<String>,
    pub tables: Vec<String>,
}

impl From<&DashboardConfig> for DashboardSummary {
    fn from(config: &DashboardConfig) -> Self {
        DashboardSummary {
            name: config.name.clone(),
            title: config.title.clone(),
            filters: config.filters.clone(),
            kpis: config.kpis.iter().map(|k| k.name.clone()).collect(),
            tables: config.tables.iter().map(|t| t.name.clone()).collect(),
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "reportId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "report": null
    })
}
