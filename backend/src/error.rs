//! Error types for the warehouse load pipeline.
//!
//! One error type per pipeline step:
//!
//! - [`ConfigError`] - Missing or invalid settings
//! - [`ExtractError`] - Reading and parsing a CSV file
//! - [`DatabaseError`] - Connecting, dropping, creating and copying
//! - [`ToolError`] - Running the external transformation command
//! - [`ReportError`] - Building or writing the revenue report
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Lower-level errors convert into [`PipelineError`] through the
//! orchestrator, which also records the stage that failed.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::models::Stage;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading settings from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

// =============================================================================
// Extraction Errors
// =============================================================================

/// Errors while reading a source CSV file.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file is missing or unreadable.
    #[error("Cannot read {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file has no header row.
    #[error("No columns to parse from {}", .path.display())]
    Empty { path: PathBuf },

    /// The bytes cannot be decoded as text.
    #[error("Cannot decode {}: {message}", .path.display())]
    Encoding { path: PathBuf, message: String },

    /// The CSV structure is malformed.
    #[error("Malformed CSV {} at line {line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },
}

// =============================================================================
// Database Errors
// =============================================================================

/// Errors from the PostgreSQL warehouse.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Could not open a session.
    #[error("Cannot connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// A statement against a table failed.
    #[error("Statement on {table} failed ({action}): {source}")]
    Statement {
        table: String,
        action: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    /// A table name is not a plain lowercase identifier.
    #[error("Invalid table name: {0:?}")]
    InvalidIdentifier(String),
}

// =============================================================================
// External Tool Errors
// =============================================================================

/// Errors from the external transformation command.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The project directory does not exist.
    #[error("Transformation project not found: {}", .0.display())]
    MissingProject(PathBuf),

    /// The command could not be started.
    #[error("Cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited non-zero.
    #[error("{program} transformation failed ({status})")]
    Failed { program: String, status: ExitStatus },
}

// =============================================================================
// Report Errors
// =============================================================================

/// Errors while producing the revenue report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report needs a session.
    #[error("Report connection error: {0}")]
    Database(#[from] DatabaseError),

    /// A report query failed.
    #[error("Report query '{query}' failed: {source}")]
    Query {
        query: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Writing the report file failed.
    #[error("Cannot write report to {}: {message}", .path.display())]
    Output { path: PathBuf, message: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// Returned by [`crate::pipeline::Pipeline::run`]. Each variant except
/// [`PipelineError::Config`] knows the [`Stage`] it failed in; a
/// configuration error happens before the first stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Settings could not be resolved.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Extracting a dataset failed.
    #[error("Extracting {file} failed: {source}")]
    Extract {
        file: String,
        #[source]
        source: ExtractError,
    },

    /// Loading a dataset failed.
    #[error("Loading {table} failed: {source}")]
    Load {
        table: String,
        #[source]
        source: DatabaseError,
    },

    /// The transformation step failed.
    #[error("Transformation failed: {0}")]
    Transform(#[from] ToolError),

    /// The report step failed.
    #[error("Report failed: {0}")]
    Report(#[from] ReportError),
}

impl PipelineError {
    /// Stage the pipeline was in when it failed.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Config(_) => None,
            PipelineError::Extract { .. } | PipelineError::Load { .. } => Some(Stage::ExtractLoad),
            PipelineError::Transform(_) => Some(Stage::Transform),
            PipelineError::Report(_) => Some(Stage::Report),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for extraction.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Result type for the transformation command.
pub type ToolResult<T> = Result<T, ToolError>;

/// Result type for reporting.
pub type ReportResult<T> = Result<T, ReportError>;

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;
