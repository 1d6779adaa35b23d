//! JSON Schema validation for dashboard configuration files.
//!
//! The schema is embedded at compile time from
//! `schemas/dashboard-config.json` and checked with JSON Schema Draft 7.
//! Validation runs on the raw JSON before deserialization so users get
//! every problem at once instead of serde's first-error message.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use sheetdash::validation::validate_dashboard_config;
//!
//! let config = json!({ "name": "payroll", "vocabulary": { "numeric": ["Pay"] } });
//! assert!(validate_dashboard_config(&config).is_ok());
//! ```

use serde_json::Value;

const DASHBOARD_SCHEMA: &str = include_str!("../../schemas/dashboard-config.json");

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick boolean check.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// The embedded dashboard config schema.
pub fn dashboard_schema() -> Result<Value, Vec<String>> {
    serde_json::from_str(DASHBOARD_SCHEMA)
        .map_err(|e| vec![format!("Embedded dashboard schema is not JSON: {}", e)])
}

/// Validate a dashboard config against the embedded schema.
pub fn validate_dashboard_config(data: &Value) -> Result<(), Vec<String>> {
    let schema = dashboard_schema()?;
    validate(&schema, data)
}
