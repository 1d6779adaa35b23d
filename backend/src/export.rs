//! CSV downloads: the blank template for a dashboard and filtered records.

use std::io::{self, Write};

use crate::dashboard::DashboardConfig;
use crate::models::Dataset;

/// Template CSV: the dashboard's expected headers and its sample rows.
///
/// Falls back to the vocabulary columns, header only, when the dashboard
/// defines no template.
pub fn write_template<W: Write>(config: &DashboardConfig, writer: W) -> io::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    match &config.template {
        Some(template) => {
            csv.write_record(&template.columns).map_err(io::Error::from)?;
            for row in &template.rows {
                csv.write_record(row).map_err(io::Error::from)?;
            }
        }
        None => {
            let headers: Vec<&String> = config.vocabulary.columns().collect();
            csv.write_record(headers).map_err(io::Error::from)?;
        }
    }

    csv.flush()
}

/// Records as CSV, header first. Missing values are empty cells.
pub fn write_records<W: Write>(dataset: &Dataset, writer: W) -> io::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(dataset.column_names()).map_err(io::Error::from)?;
    for record in &dataset.records {
        csv.write_record(record.iter().map(|v| v.to_cell_string()))
            .map_err(io::Error::from)?;
    }
    csv.flush()
}
