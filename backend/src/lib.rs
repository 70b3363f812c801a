//! # Olistload - Olist e-commerce warehouse loader
//!
//! Loads the Olist CSV exports into PostgreSQL, runs the dbt project that
//! builds the analytics models, and prints a revenue report.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV files  │────▶│  Warehouse  │────▶│     dbt     │────▶│   Revenue   │
//! │  (extract)  │     │ (drop+copy) │     │   (build)   │     │   report    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per step
//! - [`config`] - Settings from the environment
//! - [`models`] - Dataset descriptors, batches and stats
//! - [`extract`] - CSV reading
//! - [`warehouse`] - PostgreSQL loading and reporting
//! - [`dbt`] - External transformation trigger
//! - [`pipeline`] - Orchestration
//! - [`logs`] - Progress logging

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Steps
pub mod dbt;
pub mod extract;
pub mod warehouse;

// Orchestration
pub mod pipeline;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DbConfig, DbtConfig, Settings};

pub use error::{
    ConfigError, DatabaseError, ExtractError, PipelineError, ReportError, ToolError,
};

pub use models::{dataset_for_table, Batch, Dataset, LoadStats, Stage, DATASETS};

pub use extract::{read_csv, CsvExtractor, Extract, ParsedCsv};

pub use warehouse::{
    ColumnType, Load, Report, RevenueReport, RevenueReporter, TableSchema, Warehouse,
};

pub use dbt::{DbtRunner, Transform};

pub use pipeline::{Pipeline, PipelineOptions, RunSummary, WarehousePipeline};
