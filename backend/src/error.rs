//! Error types for the sheetdash pipeline.
//!
//! - [`IngestError`] - the upload cannot be decoded at all (always fatal)
//! - [`ConfigError`] - dashboard configuration errors
//! - [`PipelineError`] - orchestration errors, including missing required columns
//! - [`ServerError`] - HTTP adapter errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Cell-level coercion failures and missing optional columns are not errors:
//! the first become [`crate::models::Value::Missing`], the second omit the
//! affected output section.

use thiserror::Error;

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors while turning uploaded bytes into a raw table.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Bytes could not be decoded as text.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Malformed CSV record.
    #[error("Invalid CSV at line {line}: {message}")]
    Csv { line: u64, message: String },

    /// Workbook could not be opened or read.
    #[error("Invalid workbook: {0}")]
    Workbook(String),

    /// Empty upload.
    #[error("Uploaded file is empty")]
    EmptyInput,

    /// No header row.
    #[error("No header row found")]
    NoHeaders,

    /// Extension not handled by any reader.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading a dashboard configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON could not be parsed or deserialized.
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config does not satisfy the dashboard schema.
    #[error("Config failed schema validation: {errors:?}")]
    Schema { errors: Vec<String> },

    /// No preset with that name and no file at that path.
    #[error("Unknown dashboard: {0}")]
    UnknownDashboard(String),

    /// Structurally valid but semantically wrong.
    #[error("Invalid dashboard config: {0}")]
    Invalid(String),

    /// IO error.
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// `FatalParse`, `Config` and `Io` abort a whole invocation.
/// `MissingRequiredColumn` aborts only the computation that raised it; the
/// report builder records it and keeps going.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upload could not be parsed.
    #[error("Could not parse upload: {0}")]
    FatalParse(#[from] IngestError),

    /// A required computation references a column the dataset lacks.
    #[error("Missing required column '{column}' for {context}")]
    MissingRequiredColumn { column: String, context: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error while writing output.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn missing_column(column: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredColumn {
            column: column.into(),
            context: context.into(),
        }
    }

    /// Whether this error aborts the whole invocation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MissingRequiredColumn { .. })
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No such dashboard.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for ingestion.
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
