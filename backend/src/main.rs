//! Sheetdash CLI - spreadsheet uploads to dashboard reports
//!
//! # Main Commands
//!
//! ```bash
//! sheetdash serve                                # Start HTTP server (port 3000)
//! sheetdash report sales.csv -d sales            # Build a dashboard report (JSON)
//! sheetdash report hr.xlsx -d hr -f Department=HR,IT
//! sheetdash export sales.csv -d sales --year 2023 -o filtered.csv
//! sheetdash template hobby -o hobby_template.csv
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! sheetdash parse input.csv          # Show detected format and first rows
//! sheetdash dashboards               # List built-in dashboards
//! sheetdash config my-dash.json      # Validate and print a dashboard config
//! ```

use clap::{Parser, Subcommand};
use sheetdash::{
    api::ServerConfig, build_report_file, parse_file, run_file, write_records, write_template,
    DashboardConfig, FilterSelection,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sheetdash")]
#[command(about = "Turn CSV and spreadsheet uploads into dashboard KPIs and tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an upload and show what was detected
    Parse {
        /// Input CSV or workbook
        input: PathBuf,

        /// Number of rows to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a dashboard report: KPIs and aggregate tables as JSON
    Report {
        /// Input CSV or workbook
        input: PathBuf,

        /// Built-in dashboard name or path to a JSON config
        #[arg(short, long)]
        dashboard: String,

        /// Keep only these values: COLUMN=value1,value2 (repeatable)
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, Vec<String>)>,

        /// Keep only these years of the dashboard's year column (repeatable)
        #[arg(short, long = "year")]
        years: Vec<i32>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the filtered records as CSV
    Export {
        /// Input CSV or workbook
        input: PathBuf,

        /// Built-in dashboard name or path to a JSON config
        #[arg(short, long)]
        dashboard: String,

        /// Keep only these values: COLUMN=value1,value2 (repeatable)
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, Vec<String>)>,

        /// Keep only these years of the dashboard's year column (repeatable)
        #[arg(short, long = "year")]
        years: Vec<i32>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the CSV template of a dashboard
    Template {
        /// Built-in dashboard name or path to a JSON config
        dashboard: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List built-in dashboards
    Dashboards,

    /// Validate a dashboard config and print it as JSON
    Config {
        /// Built-in dashboard name or path to a JSON config
        dashboard: String,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: SHEETDASH_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input, limit, output } => cmd_parse(&input, limit, output.as_deref()),

        Commands::Report {
            input,
            dashboard,
            filters,
            years,
            output,
        } => cmd_report(&input, &dashboard, filters, years, output.as_deref()),

        Commands::Export {
            input,
            dashboard,
            filters,
            years,
            output,
        } => cmd_export(&input, &dashboard, filters, years, output.as_deref()),

        Commands::Template { dashboard, output } => cmd_template(&dashboard, output.as_deref()),

        Commands::Dashboards => cmd_dashboards(),

        Commands::Config { dashboard } => cmd_config(&dashboard),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, limit: usize, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let table = parse_file(input)?;
    let info = &table.info;

    if let Some(ref encoding) = info.encoding {
        eprintln!("   Encoding: {}", encoding);
    }
    if let Some(delimiter) = info.delimiter {
        eprintln!("   Delimiter: '{}'", format_delimiter(delimiter));
    }
    if let Some(ref sheet) = info.sheet {
        eprintln!("   Sheet: {}", sheet);
    }
    eprintln!("   Columns: {}", info.headers.join(", "));
    eprintln!("✅ Parsed {} rows", info.row_count);

    let json = serde_json::to_string_pretty(&table.preview(limit))?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_report(
    input: &Path,
    dashboard: &str,
    filters: Vec<(String, Vec<String>)>,
    years: Vec<i32>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = DashboardConfig::resolve(dashboard)?;
    let selection = build_selection(&config, filters, years)?;

    eprintln!("📊 Dashboard: {} ({})", config.title, config.name);
    let report = build_report_file(input, &config, &selection)?;

    eprintln!("   Rows: {} of {}", report.filtered_rows, report.total_rows);
    for kpi in &report.kpis {
        match kpi.value {
            Some(v) => eprintln!("   {}: {:.2}", kpi.name, v),
            None => eprintln!("   {}: -", kpi.name),
        }
    }
    for error in &report.errors {
        eprintln!("   ⚠️  {}: {}", error.section, error.message);
    }

    let json = serde_json::to_string_pretty(&report)?;
    write_output(&json, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_export(
    input: &Path,
    dashboard: &str,
    filters: Vec<(String, Vec<String>)>,
    years: Vec<i32>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = DashboardConfig::resolve(dashboard)?;
    let selection = build_selection(&config, filters, years)?;

    let run = run_file(input, &config, &selection)?;
    eprintln!("📦 Exporting {} of {} records", run.filtered.len(), run.dataset.len());

    let mut buffer = Vec::new();
    write_records(&run.filtered, &mut buffer)?;
    write_bytes(&buffer, output)
}

fn cmd_template(dashboard: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = DashboardConfig::resolve(dashboard)?;
    let mut buffer = Vec::new();
    write_template(&config, &mut buffer)?;
    write_bytes(&buffer, output)
}

fn cmd_dashboards() -> Result<(), Box<dyn std::error::Error>> {
    for config in sheetdash::dashboard::presets::all() {
        println!("  📄 {} - {}", config.name, config.title);
        if !config.filters.is_empty() {
            println!("     Filters: {}", config.filters.join(", "));
        }
        println!("     KPIs: {}", config.kpis.len());
        println!("     Tables: {}", config.tables.len());
        println!();
    }
    Ok(())
}

fn cmd_config(dashboard: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = DashboardConfig::resolve(dashboard)?;
    eprintln!("✅ Dashboard config '{}' is valid", config.name);
    println!("{}", config.to_json()?);
    Ok(())
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env();
    if let Some(port) = port {
        config = config.with_port(port);
    }
    sheetdash::api::start_server(config).await
}

/// `--filter` values as a selection; `--year` applies to the dashboard's year column.
fn build_selection(
    config: &DashboardConfig,
    filters: Vec<(String, Vec<String>)>,
    years: Vec<i32>,
) -> Result<FilterSelection, Box<dyn std::error::Error>> {
    let mut selection = FilterSelection::new();
    for (column, values) in filters {
        selection = selection.allow(column, values);
    }

    if !years.is_empty() {
        let column = config
            .year_filter
            .clone()
            .ok_or_else(|| format!("Dashboard '{}' has no year filter", config.name))?;
        selection = selection.allow_years(column, years);
    }

    Ok(selection)
}

fn parse_filter(arg: &str) -> Result<(String, Vec<String>), String> {
    let (column, values) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=value1,value2, got '{}'", arg))?;
    if column.is_empty() {
        return Err(format!("missing column name in '{}'", arg));
    }
    let values = if values.is_empty() {
        Vec::new()
    } else {
        values.split(',').map(str::to_string).collect()
    };
    Ok((column.to_string(), values))
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

fn write_bytes(content: &[u8], path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(content)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("Department=HR,IT").unwrap(),
            ("Department".to_string(), vec!["HR".to_string(), "IT".to_string()])
        );
        assert_eq!(parse_filter("Product Name=Oak Chair").unwrap().1, vec!["Oak Chair"]);
        assert!(parse_filter("Region=").unwrap().1.is_empty());
        assert!(parse_filter("Region").is_err());
        assert!(parse_filter("=East").is_err());
    }

    #[test]
    fn test_year_needs_year_column() {
        let hr = DashboardConfig::preset("hr").unwrap();
        assert!(build_selection(&hr, vec![], vec![2023]).is_err());

        let sales = DashboardConfig::preset("sales").unwrap();
        let selection = build_selection(&sales, vec![], vec![2023]).unwrap();
        assert!(selection.years["Order Date"].contains(&2023));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
