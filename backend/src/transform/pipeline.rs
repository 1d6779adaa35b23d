//! High-level pipeline API: upload bytes to dashboard report.
//!
//! Combines every stage for one invocation:
//! parsing, coercion, derived fields, filtering, KPIs and aggregate tables.
//! Nothing is kept between invocations; running twice on the same input gives
//! the same report.
//!
//! # Example
//!
//! ```rust,ignore
//! use sheetdash::dashboard::DashboardConfig;
//! use sheetdash::transform::{build_report_file, FilterSelection};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DashboardConfig::preset("hr")?;
//!     let selection = FilterSelection::new().allow("Department", ["HR", "IT"]);
//!     let report = build_report_file("employees.csv", &config, &selection)?;
//!     println!("{} of {} employees", report.filtered_rows, report.total_rows);
//!     Ok(())
//! }
//! ```
//!
//! # Errors
//!
//! An upload that cannot be parsed, or a filter on a column the upload lacks,
//! fails the whole call. A KPI or required table that names an absent column
//! is listed in [`DashboardReport::errors`] and the other sections are still
//! produced; an optional table is listed in [`DashboardReport::omitted`].

use serde::Serialize;
use std::path::Path;

use super::aggregate::{aggregate, AggregateTable};
use super::coerce::{coerce, CoercionStats};
use super::derive::{apply_derived, SkippedDerived};
use super::filter::FilterSelection;
use super::kpi::{compute_kpi, KpiValue};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::dashboard::DashboardConfig;
use crate::error::PipelineResult;
use crate::models::Dataset;
use crate::parser::{parse_bytes, parse_file, RawTable, SourceInfo};

// =============================================================================
// Report types
// =============================================================================

/// Everything the presentation layer needs for one dashboard render.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub dashboard: String,
    pub title: String,
    pub source: SourceInfo,
    /// Records after coercion, before filtering.
    pub total_rows: usize,
    pub filtered_rows: usize,
    /// Values offered for each configured filter, from the unfiltered data.
    pub filter_options: Vec<FilterOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years: Option<YearOptions>,
    pub coercion: CoercionStats,
    /// Derived fields that were computed.
    pub derived: Vec<String>,
    pub skipped_derived: Vec<SkippedDerived>,
    pub kpis: Vec<KpiValue>,
    pub tables: Vec<AggregateTable>,
    /// Optional sections left out because a column is absent.
    pub omitted: Vec<String>,
    pub errors: Vec<SectionError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub column: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearOptions {
    pub column: String,
    pub values: Vec<i32>,
}

/// A required section that could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionError {
    pub section: String,
    pub message: String,
}

impl DashboardReport {
    /// No required section failed.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&AggregateTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn kpi(&self, name: &str) -> Option<f64> {
        self.kpis.iter().find(|k| k.name == name)?.value
    }
}

/// A report together with the datasets it was computed from.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Coerced records with derived fields, unfiltered.
    pub dataset: Dataset,
    pub filtered: Dataset,
    pub report: DashboardReport,
}

// =============================================================================
// Entry points
// =============================================================================

/// Build a report from an uploaded file's bytes.
pub fn build_report(
    bytes: &[u8],
    file_name: Option<&str>,
    config: &DashboardConfig,
    selection: &FilterSelection,
) -> PipelineResult<DashboardReport> {
    Ok(run_bytes(bytes, file_name, config, selection)?.report)
}

/// Build a report from a file on disk.
pub fn build_report_file<P: AsRef<Path>>(
    path: P,
    config: &DashboardConfig,
    selection: &FilterSelection,
) -> PipelineResult<DashboardReport> {
    Ok(run_file(path, config, selection)?.report)
}

/// Build a report from an already-parsed table.
pub fn build_report_from_table(
    raw: RawTable,
    config: &DashboardConfig,
    selection: &FilterSelection,
) -> PipelineResult<DashboardReport> {
    Ok(run_table(raw, config, selection)?.report)
}

pub fn run_bytes(
    bytes: &[u8],
    file_name: Option<&str>,
    config: &DashboardConfig,
    selection: &FilterSelection,
) -> PipelineResult<PipelineRun> {
    log_info("📖 Reading upload...");
    let raw = parse_bytes(bytes, file_name)?;
    run_table(raw, config, selection)
}

pub fn run_file<P: AsRef<Path>>(
    path: P,
    config: &DashboardConfig,
    selection: &FilterSelection,
) -> PipelineResult<PipelineRun> {
    log_info(format!("📖 Reading {}...", path.as_ref().display()));
    let raw = parse_file(path)?;
    run_table(raw, config, selection)
}

/// Run every stage after parsing.
pub fn run_table(
    raw: RawTable,
    config: &DashboardConfig,
    selection: &FilterSelection,
) -> PipelineResult<PipelineRun> {
    print_source_info(&raw.info);

    // Step 1: coercion
    let (mut dataset, coercion) = coerce(&raw, &config.vocabulary);
    for (column, failures) in &coercion.failures {
        log_warning(format!("{} unreadable value(s) in '{}' treated as missing", failures, column));
    }

    // Step 2: derived fields
    let derived = apply_derived(&mut dataset, &config.derived);
    for name in &derived.applied {
        log_success(format!("Derived '{}'", name));
    }
    for skipped in &derived.skipped {
        log_warning(format!(
            "Skipped derived '{}': missing {}",
            skipped.name,
            skipped.missing.join(", ")
        ));
    }

    // Step 3: filter options and filtering
    let mut omitted = Vec::new();
    let mut filter_options = Vec::new();
    for column in &config.filters {
        match dataset.distinct_labels(column) {
            Some(values) => filter_options.push(FilterOptions { column: column.clone(), values }),
            None => omitted.push(format!("filter '{}'", column)),
        }
    }

    let years = match &config.year_filter {
        Some(column) => match dataset.years(column) {
            Some(values) => Some(YearOptions { column: column.clone(), values }),
            None => {
                omitted.push(format!("year filter '{}'", column));
                None
            }
        },
        None => None,
    };

    let filtered = selection.apply(&dataset)?;
    if !selection.is_empty() {
        log_info(format!("🔎 {} of {} records match the filters", filtered.len(), dataset.len()));
    }

    let mut errors = Vec::new();

    // Step 4: KPIs
    let mut kpis = Vec::with_capacity(config.kpis.len());
    for spec in &config.kpis {
        match compute_kpi(&filtered, spec) {
            Ok(value) => kpis.push(KpiValue { name: spec.name.clone(), value }),
            Err(e) if !e.is_fatal() => {
                log_error(e.to_string());
                errors.push(SectionError {
                    section: format!("KPI '{}'", spec.name),
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    // Step 5: aggregate tables
    let mut tables = Vec::with_capacity(config.tables.len());
    for spec in &config.tables {
        match aggregate(&filtered, spec) {
            Ok(table) => tables.push(table),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if spec.required => {
                log_error(e.to_string());
                errors.push(SectionError {
                    section: format!("table '{}'", spec.name),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                log_info_indent(format!("'{}' omitted", spec.name), 1);
                omitted.push(format!("table '{}'", spec.name));
            }
        }
    }

    if errors.is_empty() {
        log_success(format!("{} KPIs, {} tables", kpis.len(), tables.len()));
    } else {
        log_warning(format!("{} section(s) could not be computed", errors.len()));
    }

    let report = DashboardReport {
        dashboard: config.name.clone(),
        title: config.title.clone(),
        source: raw.info,
        total_rows: dataset.len(),
        filtered_rows: filtered.len(),
        filter_options,
        years,
        coercion,
        derived: derived.applied,
        skipped_derived: derived.skipped,
        kpis,
        tables,
        omitted,
        errors,
    };

    Ok(PipelineRun {
        dataset,
        filtered,
        report,
    })
}

fn print_source_info(info: &SourceInfo) {
    if let Some(encoding) = &info.encoding {
        log_success(format!("Detected encoding: {}", encoding));
    }
    if let Some(delimiter) = info.delimiter {
        log_success(format!("Detected separator: '{}'", format_delimiter(delimiter)));
    }
    if let Some(sheet) = &info.sheet {
        log_success(format!("Read sheet: {}", sheet));
    }
    log_success(format!("Read {} rows", info.row_count));
    log_info(format!("📋 {} columns:", info.headers.len()));
    for (i, col) in info.headers.iter().enumerate() {
        log_info_indent(format!("[{:2}] {}", i + 1, col), 1);
    }
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::presets;
    use crate::error::PipelineError;

    const HR_CSV: &str = "EmployeeID,Name,Department,Gender,Age,Salary,JobLevel,HireDate,ExitDate,EmploymentStatus,PerformanceRating
1,Alice,HR,F,29,50000,1,2019-01-10,,Active,3
2,Bob,IT,M,34,60000,2,2018-03-15,2022-05-01,Exited,4
3,Charlie,Finance,M,41,75000,3,2015-07-23,,Active,5
";

    const SALES_CSV: &str = "Order Date,Region,Category,Product Name,Sales,Profit,Quantity
15/03/2023,East,Furniture,Oak Chair,240,36,2
02/01/2023,West,Technology,Desk Phone,120.5,18.25,1
20/02/2023,East,Technology,Desk Phone,80,-4,1
11/01/2023,West,Furniture,Oak Chair,n/a,10,1
";

    fn run(csv: &str, config: &DashboardConfig, selection: &FilterSelection) -> PipelineResult<DashboardReport> {
        build_report(csv.as_bytes(), Some("upload.csv"), config, selection)
    }

    #[test]
    fn test_hr_department_filter() {
        let selection = FilterSelection::new().allow("Department", ["HR", "IT"]);
        let report = run(HR_CSV, &presets::hr(), &selection).unwrap();

        assert_eq!(report.total_rows, 3);
        assert_eq!(report.filtered_rows, 2);

        let headcount = report.table("Headcount by Department").unwrap();
        assert_eq!(headcount.keys(), vec!["HR", "IT"]);
        assert_eq!(headcount.get("HR", "Count"), Some(1.0));
        assert_eq!(headcount.get("IT", "Count"), Some(1.0));
        assert_eq!(headcount.get("Finance", "Count"), None);

        assert_eq!(report.kpi("Total Employees"), Some(2.0));
        assert_eq!(report.kpi("Exited Employees"), Some(1.0));
        assert!(report.is_complete());
    }

    #[test]
    fn test_hr_filter_options_from_unfiltered_data() {
        let selection = FilterSelection::new().allow("Gender", ["F"]);
        let report = run(HR_CSV, &presets::hr(), &selection).unwrap();
        assert_eq!(report.filtered_rows, 1);
        assert_eq!(report.filter_options[0].column, "Department");
        assert_eq!(report.filter_options[0].values, vec!["HR", "IT", "Finance"]);
    }

    #[test]
    fn test_sales_months_chronological() {
        let report = run(SALES_CSV, &presets::sales(), &FilterSelection::new()).unwrap();

        let trend = report.table("Sales Over Time").unwrap();
        assert_eq!(trend.keys(), vec!["2023-01", "2023-02", "2023-03"]);
        // the unreadable Sales cell contributes nothing
        assert_eq!(trend.get("2023-01", "Sales"), Some(120.5));
        assert_eq!(report.coercion.failures.get("Sales"), Some(&1));

        assert_eq!(report.kpi("Total Sales"), Some(440.5));
        let years = report.years.as_ref().unwrap();
        assert_eq!(years.values, vec![2023]);
    }

    #[test]
    fn test_sales_top_products_sorted() {
        let report = run(SALES_CSV, &presets::sales(), &FilterSelection::new()).unwrap();
        let top = report.table("Top Products").unwrap();
        assert_eq!(top.keys(), vec!["Oak Chair", "Desk Phone"]);
        assert_eq!(top.get("Desk Phone", "Sales"), Some(200.5));
    }

    #[test]
    fn test_sales_without_sales_or_product_columns() {
        let csv = "Order Date,Region,Category,Profit,Quantity
15/03/2023,East,Furniture,36,2
02/01/2023,West,Technology,18,1
";
        let report = run(csv, &presets::sales(), &FilterSelection::new()).unwrap();

        let failed: Vec<&str> = report.errors.iter().map(|e| e.section.as_str()).collect();
        assert!(failed.contains(&"KPI 'Total Sales'"));
        assert!(report.errors[0].message.contains("'Sales'"));

        assert!(report.omitted.contains(&"table 'Top Products'".to_string()));
        assert!(report.table("Top Products").is_none());

        assert_eq!(report.kpi("Total Profit"), Some(54.0));
        assert_eq!(report.kpi("Total Quantity"), Some(3.0));
        assert!(report.table("Profit Over Time").is_some());
        assert_eq!(report.skipped_derived[0].name, "ProfitMargin");
    }

    #[test]
    fn test_year_filter() {
        let csv = "Order Date,Region,Sales\n2022-12-30,East,10\n2023-01-02,East,20\n";
        let selection = FilterSelection::new().allow_years("Order Date", [2023]);
        let report = run(csv, &presets::sales(), &selection).unwrap();
        assert_eq!(report.filtered_rows, 1);
        assert_eq!(report.kpi("Total Sales"), Some(20.0));
    }

    #[test]
    fn test_hobby_derived_end_to_end() {
        let csv = "Order Date,Buyer Name,Location,Class,Price,Quantity,Cost
2023-01-15,John Doe,Manila,Sports Car,250.00,2,150.00
2023-02-10,Jane Smith,Cebu,Truck,300.00,1,200.00
2023-02-11,John Doe,Manila,Truck,100.00,3,60.00
";
        let result = run_bytes(csv.as_bytes(), Some("hobby.csv"), &presets::hobby(), &FilterSelection::new()).unwrap();
        let report = &result.report;

        assert_eq!(report.derived, vec!["Amount Collected", "Profit"]);
        assert_eq!(report.kpi("Total Sales"), Some(1100.0));
        assert_eq!(report.kpi("Total Profit"), Some(420.0));
        assert_eq!(report.kpi("Unique Buyers"), Some(2.0));

        let by_class = report.table("Sales & Profit by Class").unwrap();
        assert_eq!(by_class.keys(), vec!["Sports Car", "Truck"]);
        assert_eq!(by_class.get("Truck", "Amount Collected"), Some(600.0));
        assert!(result.filtered.has_column("Profit"));
    }

    #[test]
    fn test_required_table_missing_column_reported() {
        let csv = "Order Date,Price,Quantity,Cost\n2023-01-15,10,1,5\n";
        let report = run(csv, &presets::hobby(), &FilterSelection::new()).unwrap();
        let sections: Vec<&str> = report.errors.iter().map(|e| e.section.as_str()).collect();
        assert_eq!(
            sections,
            vec!["KPI 'Unique Buyers'", "table 'Sales & Profit by Class'", "table 'Sales & Profit by Location'"]
        );
        assert_eq!(report.kpi("Total Sales"), Some(10.0));
        assert_eq!(report.omitted, vec!["filter 'Location'", "filter 'Class'"]);
    }

    #[test]
    fn test_unparseable_upload_is_fatal() {
        let err = run("", &presets::hr(), &FilterSelection::new()).unwrap_err();
        assert!(matches!(err, PipelineError::FatalParse(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_filter_on_absent_column_fails() {
        let selection = FilterSelection::new().allow("Region", ["East"]);
        let err = run(HR_CSV, &presets::hr(), &selection).unwrap_err();
        assert!(err.to_string().contains("Region"));
    }

    #[test]
    fn test_rerun_is_identical() {
        let selection = FilterSelection::new().allow("Region", ["East"]);
        let first = run(SALES_CSV, &presets::sales(), &selection).unwrap();
        let second = run(SALES_CSV, &presets::sales(), &selection).unwrap();
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn test_build_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("employees.csv");
        std::fs::write(&path, HR_CSV).unwrap();

        let report = build_report_file(&path, &presets::hr(), &FilterSelection::new()).unwrap();
        assert_eq!(report.total_rows, 3);
        let avg = report.kpi("Avg. Salary").unwrap();
        assert!((avg - 185000.0 / 3.0).abs() < 1e-9);
    }
}
