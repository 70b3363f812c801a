//! Domain models for the warehouse load pipeline.
//!
//! - [`Dataset`] - A source CSV file and the table it is loaded into
//! - [`DATASETS`] - The fixed, ordered set of Olist datasets
//! - [`Batch`] - Rows extracted from one CSV file
//! - [`LoadStats`] - What a load wrote to the warehouse
//! - [`Stage`] - The pipeline step a run is in

use serde::{Deserialize, Serialize};

// =============================================================================
// Dataset Descriptors
// =============================================================================

/// A source file and its destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dataset {
    /// CSV file name, relative to the data directory.
    pub file: &'static str,
    /// Destination table name.
    pub table: &'static str,
}

impl Dataset {
    pub const fn new(file: &'static str, table: &'static str) -> Self {
        Self { file, table }
    }
}

/// Datasets loaded by every run, in load order.
pub const DATASETS: &[Dataset] = &[
    Dataset::new("olist_orders_dataset.csv", "fact_orders"),
    Dataset::new("olist_customers_dataset.csv", "dim_customers"),
    Dataset::new("olist_products_dataset.csv", "dim_products"),
    Dataset::new("olist_order_items_dataset.csv", "fact_order_items"),
];

/// Look up a dataset by its destination table.
pub fn dataset_for_table(table: &str) -> Option<Dataset> {
    DATASETS.iter().copied().find(|d| d.table == table)
}

// =============================================================================
// Tabular Batch
// =============================================================================

/// Rows extracted from a CSV file.
///
/// A cell is `None` when the source value is one of the missing-value
/// markers. Every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Batch {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Iterate the cells of column `index`.
    pub fn column(&self, index: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).and_then(|c| c.as_deref()))
    }
}

// =============================================================================
// Load Statistics
// =============================================================================

/// Outcome of replacing one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    pub table: String,
    pub rows: u64,
    pub columns: Vec<String>,
}

// =============================================================================
// Pipeline Stage
// =============================================================================

/// Pipeline states, in order. A failure in any of the first three ends
/// the run with a [`crate::PipelineError`] naming that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExtractLoad,
    Transform,
    Report,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::ExtractLoad => "extract-load",
            Stage::Transform => "transform",
            Stage::Report => "report",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_order() {
        let tables: Vec<_> = DATASETS.iter().map(|d| d.table).collect();
        assert_eq!(
            tables,
            vec!["fact_orders", "dim_customers", "dim_products", "fact_order_items"]
        );
    }

    #[test]
    fn test_dataset_lookup() {
        let d = dataset_for_table("dim_products").unwrap();
        assert_eq!(d.file, "olist_products_dataset.csv");
        assert!(dataset_for_table("fact_payments").is_none());
    }

    #[test]
    fn test_batch_column() {
        let mut batch = Batch::new(vec!["a".into(), "b".into()]);
        batch.rows.push(vec![Some("1".into()), None]);
        batch.rows.push(vec![Some("2".into()), Some("x".into())]);

        let b: Vec<_> = batch.column(1).collect();
        assert_eq!(b, vec![None, Some("x")]);
        assert_eq!(batch.row_count(), 2);
        assert_eq!(batch.column_count(), 2);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ExtractLoad.to_string(), "extract-load");
        assert_eq!(Stage::Done.to_string(), "done");
    }
}
