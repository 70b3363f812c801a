//! Pipeline orchestration: extract and load every dataset, run the
//! transformation, then build the revenue report.
//!
//! # Example
//!
//! ```rust,ignore
//! use olistload::{Pipeline, PipelineOptions, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     let summary = Pipeline::from_settings(&settings)
//!         .run(&PipelineOptions::default())
//!         .await?;
//!     println!("Loaded {} tables", summary.loaded.len());
//!     Ok(())
//! }
//! ```
//!
//! Stages run strictly in order and the first error ends the run. Tables
//! loaded before a failure stay loaded; nothing is rolled back.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Settings;
use crate::dbt::{DbtRunner, Transform};
use crate::error::{PipelineError, PipelineResult};
use crate::extract::{CsvExtractor, Extract};
use crate::logs::{log_info, log_success};
use crate::models::{Dataset, LoadStats, Stage, DATASETS};
use crate::warehouse::{Load, Report, RevenueReport, RevenueReporter, Warehouse};

/// Options for a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Stop after loading
    pub skip_transform: bool,

    /// Do not build the report
    pub skip_report: bool,

    /// Also write the report as JSON
    pub report_json: Option<PathBuf>,
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// One entry per dataset, in load order
    pub loaded: Vec<LoadStats>,

    /// Whether the transformation ran
    pub transformed: bool,

    /// The report, unless skipped
    pub report: Option<RevenueReport>,
}

/// The production wiring: CSV files, PostgreSQL and dbt.
pub type WarehousePipeline = Pipeline<CsvExtractor, Warehouse, DbtRunner, RevenueReporter>;

/// Runs extract, load, transform and report in order.
pub struct Pipeline<E, L, T, R> {
    extractor: E,
    loader: L,
    transformer: T,
    reporter: R,
    datasets: Vec<Dataset>,
}

impl WarehousePipeline {
    pub fn from_settings(settings: &Settings) -> Self {
        let warehouse = Warehouse::new(settings.db.clone());
        Pipeline::new(
            CsvExtractor::new(&settings.data_dir).with_delimiter(settings.delimiter),
            warehouse.clone(),
            DbtRunner::new(settings.dbt.clone()),
            RevenueReporter::new(warehouse),
        )
    }
}

impl<E, L, T, R> Pipeline<E, L, T, R>
where
    E: Extract,
    L: Load,
    T: Transform,
    R: Report,
{
    /// A pipeline over the standard datasets.
    pub fn new(extractor: E, loader: L, transformer: T, reporter: R) -> Self {
        Self {
            extractor,
            loader,
            transformer,
            reporter,
            datasets: DATASETS.to_vec(),
        }
    }

    /// Restrict the run to some datasets, in the given order.
    pub fn with_datasets(mut self, datasets: Vec<Dataset>) -> Self {
        self.datasets = datasets;
        self
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Run every stage.
    pub async fn run(&self, options: &PipelineOptions) -> PipelineResult<RunSummary> {
        log_info("Pipeline started");

        // Step 1: Extract & Load
        log_info(format!("Stage: {}", Stage::ExtractLoad));
        let loaded = self.extract_load().await?;

        // Step 2: Transform
        log_info(format!("Stage: {}", Stage::Transform));
        let transformed = if options.skip_transform {
            log_info("Transformation skipped");
            false
        } else {
            self.transform().await?;
            true
        };

        // Step 3: Report
        log_info(format!("Stage: {}", Stage::Report));
        let report = if options.skip_report {
            log_info("Report skipped");
            None
        } else {
            Some(self.report(options).await?)
        };

        log_success(format!("Stage: {}. Full pipeline complete", Stage::Done));
        Ok(RunSummary {
            loaded,
            transformed,
            report,
        })
    }

    /// Extract and load every dataset in order.
    pub async fn extract_load(&self) -> PipelineResult<Vec<LoadStats>> {
        let mut loaded = Vec::with_capacity(self.datasets.len());
        for dataset in &self.datasets {
            loaded.push(self.load_dataset(dataset).await?);
        }
        Ok(loaded)
    }

    /// Extract one dataset and replace its table.
    pub async fn load_dataset(&self, dataset: &Dataset) -> PipelineResult<LoadStats> {
        log_info(format!("Extracting {}...", dataset.file));
        let batch = self
            .extractor
            .extract(dataset)
            .map_err(|source| PipelineError::Extract {
                file: dataset.file.to_string(),
                source,
            })?;

        log_info(format!(
            "Loading {} ({} rows) to Postgres...",
            dataset.table,
            batch.row_count()
        ));
        self.loader
            .replace(dataset.table, batch)
            .await
            .map_err(|source| PipelineError::Load {
                table: dataset.table.to_string(),
                source,
            })
    }

    /// Run the transformation step.
    pub async fn transform(&self) -> PipelineResult<()> {
        log_info("Running dbt transformations...");
        self.transformer.transform().await?;
        Ok(())
    }

    /// Build the report and write it out if requested.
    pub async fn report(&self, options: &PipelineOptions) -> PipelineResult<RevenueReport> {
        log_info("Generating final reports...");
        let report = self.reporter.report().await?;
        if let Some(ref path) = options.report_json {
            report.write_json(path)?;
            log_success(format!("Report saved to {}", path.display()));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseResult, ExtractError, ExtractResult, ReportResult, ToolError, ToolResult};
    use crate::models::Batch;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::{BTreeMap, HashMap};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    type Events = Arc<Mutex<Vec<String>>>;

    struct FakeExtractor {
        files: HashMap<&'static str, Batch>,
    }

    impl Extract for FakeExtractor {
        fn extract(&self, dataset: &Dataset) -> ExtractResult<Batch> {
            self.files
                .get(dataset.file)
                .cloned()
                .ok_or_else(|| ExtractError::FileAccess {
                    path: Path::new(dataset.file).to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
        }
    }

    #[derive(Default, Clone)]
    struct FakeWarehouse {
        tables: Arc<Mutex<BTreeMap<String, Batch>>>,
        events: Events,
    }

    #[async_trait]
    impl Load for FakeWarehouse {
        async fn replace(&self, table: &str, batch: Batch) -> DatabaseResult<LoadStats> {
            self.events.lock().unwrap().push(format!("load:{table}"));
            let stats = LoadStats {
                table: table.to_string(),
                rows: batch.row_count() as u64,
                columns: batch.headers.clone(),
            };
            self.tables.lock().unwrap().insert(table.to_string(), batch);
            Ok(stats)
        }
    }

    struct FakeTransform {
        fail: bool,
        events: Events,
    }

    #[async_trait]
    impl Transform for FakeTransform {
        async fn transform(&self) -> ToolResult<()> {
            self.events.lock().unwrap().push("transform".into());
            if self.fail {
                return Err(ToolError::MissingProject("olist_analytics".into()));
            }
            Ok(())
        }
    }

    struct FakeReport {
        events: Events,
    }

    #[async_trait]
    impl Report for FakeReport {
        async fn report(&self) -> ReportResult<RevenueReport> {
            self.events.lock().unwrap().push("report".into());
            Ok(RevenueReport {
                generated_at: Utc::now(),
                total_revenue: 0.0,
                total_freight: 0.0,
                orders: 0,
                monthly: vec![],
                top_categories: vec![],
                by_state: vec![],
            })
        }
    }

    fn batch(headers: &[&str], rows: usize) -> Batch {
        let mut b = Batch::new(headers.iter().map(|h| h.to_string()).collect());
        for i in 0..rows {
            b.rows
                .push(headers.iter().map(|h| Some(format!("{h}-{i}"))).collect());
        }
        b
    }

    fn all_files() -> HashMap<&'static str, Batch> {
        HashMap::from([
            ("olist_orders_dataset.csv", batch(&["order_id", "customer_id"], 3)),
            ("olist_customers_dataset.csv", batch(&["customer_id", "customer_state"], 2)),
            ("olist_products_dataset.csv", batch(&["product_id", "product_category_name"], 4)),
            ("olist_order_items_dataset.csv", batch(&["order_id", "product_id", "price"], 5)),
        ])
    }

    struct Harness {
        pipeline: Pipeline<FakeExtractor, FakeWarehouse, FakeTransform, FakeReport>,
        warehouse: FakeWarehouse,
        events: Events,
    }

    fn harness(files: HashMap<&'static str, Batch>, fail_transform: bool) -> Harness {
        let events: Events = Arc::default();
        let warehouse = FakeWarehouse {
            tables: Arc::default(),
            events: events.clone(),
        };
        let pipeline = Pipeline::new(
            FakeExtractor { files },
            warehouse.clone(),
            FakeTransform {
                fail: fail_transform,
                events: events.clone(),
            },
            FakeReport {
                events: events.clone(),
            },
        );
        Harness {
            pipeline,
            warehouse,
            events,
        }
    }

    #[tokio::test]
    async fn test_full_run_loads_every_dataset() {
        let h = harness(all_files(), false);
        let summary = h.pipeline.run(&PipelineOptions::default()).await.unwrap();

        assert!(summary.transformed);
        assert!(summary.report.is_some());

        let files = all_files();
        let tables = h.warehouse.tables.lock().unwrap();
        for dataset in DATASETS {
            let source = &files[dataset.file];
            let loaded = &tables[dataset.table];
            assert_eq!(loaded.row_count(), source.row_count());
            assert_eq!(loaded.headers, source.headers);
        }

        assert_eq!(
            *h.events.lock().unwrap(),
            vec![
                "load:fact_orders",
                "load:dim_customers",
                "load:dim_products",
                "load:fact_order_items",
                "transform",
                "report",
            ]
        );
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let h = harness(all_files(), false);
        h.pipeline.run(&PipelineOptions::default()).await.unwrap();
        let first = h.warehouse.tables.lock().unwrap().clone();

        h.pipeline.run(&PipelineOptions::default()).await.unwrap();
        let second = h.warehouse.tables.lock().unwrap().clone();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_transform_failure_skips_report() {
        let h = harness(all_files(), true);
        let err = h.pipeline.run(&PipelineOptions::default()).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Transform));
        let events = h.events.lock().unwrap();
        assert!(events.contains(&"transform".to_string()));
        assert!(!events.contains(&"report".to_string()));
    }

    #[tokio::test]
    async fn test_second_extract_failure_keeps_first_table() {
        let mut files = all_files();
        files.remove("olist_customers_dataset.csv");
        let h = harness(files, false);

        let err = h.pipeline.run(&PipelineOptions::default()).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ExtractLoad));
        assert!(err.to_string().contains("olist_customers_dataset.csv"));

        let tables = h.warehouse.tables.lock().unwrap();
        assert!(tables.contains_key("fact_orders"));
        assert!(!tables.contains_key("dim_customers"));
        assert!(!tables.contains_key("dim_products"));
        assert!(!h.events.lock().unwrap().contains(&"transform".to_string()));
    }

    #[tokio::test]
    async fn test_orders_example() {
        let h = harness(all_files(), false);
        let stats = h.pipeline.load_dataset(&DATASETS[0]).await.unwrap();

        assert_eq!(stats.table, "fact_orders");
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.columns, vec!["order_id", "customer_id"]);
        let tables = h.warehouse.tables.lock().unwrap();
        assert_eq!(tables["fact_orders"].rows[2][0].as_deref(), Some("order_id-2"));
    }

    #[tokio::test]
    async fn test_with_datasets_loads_only_those() {
        let h = harness(all_files(), false);
        let pipeline = h.pipeline.with_datasets(vec![DATASETS[2]]);
        let loaded = pipeline.extract_load().await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].table, "dim_products");
        assert_eq!(*h.events.lock().unwrap(), vec!["load:dim_products"]);
    }

    #[tokio::test]
    async fn test_skip_options() {
        let h = harness(all_files(), true);
        let options = PipelineOptions {
            skip_transform: true,
            skip_report: true,
            report_json: None,
        };
        let summary = h.pipeline.run(&options).await.unwrap();

        assert!(!summary.transformed);
        assert!(summary.report.is_none());
        assert_eq!(summary.loaded.len(), 4);
    }

    #[tokio::test]
    async fn test_report_json_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revenue.json");
        let h = harness(all_files(), false);
        let options = PipelineOptions {
            report_json: Some(path.clone()),
            ..PipelineOptions::default()
        };

        h.pipeline.run(&options).await.unwrap();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_directory_restored_after_failed_transform() {
        let dir = tempfile::tempdir().unwrap();
        let before = std::env::current_dir().unwrap();
        let events: Events = Arc::default();
        let pipeline = Pipeline::new(
            FakeExtractor { files: all_files() },
            FakeWarehouse::default(),
            DbtRunner::new(crate::config::DbtConfig {
                project_dir: dir.path().to_path_buf(),
                program: "sh".into(),
                args: vec!["-c".into(), "exit 1".into()],
            }),
            FakeReport {
                events: events.clone(),
            },
        );

        let err = pipeline.run(&PipelineOptions::default()).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Transform));
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}
