//! Olistload CLI - Load the Olist CSV exports into PostgreSQL
//!
//! # Main Command
//!
//! ```bash
//! olistload run                      # Extract, load, dbt build, revenue report
//! olistload run --report-json r.json # ... and save the report as JSON
//! ```
//!
//! # Step Commands (for development)
//!
//! ```bash
//! olistload extract data/olist_orders_dataset.csv  # Parse one CSV, show columns
//! olistload load --table fact_orders                # Extract + load one dataset
//! olistload transform                               # Run dbt only
//! olistload report                                  # Revenue report only
//! olistload inspect                                 # Row counts of loaded tables
//! olistload datasets                                # List file -> table pairs
//! ```

use clap::{Parser, Subcommand};
use olistload::logs::{self, log_error, log_info, log_success, log_warning};
use olistload::warehouse::report::DEFAULT_TOP_CATEGORIES;
use olistload::config::parse_delimiter;
use olistload::error::PipelineResult;
use olistload::{
    dataset_for_table, read_csv, ColumnType, CsvExtractor, DbtRunner, Pipeline, PipelineOptions,
    RevenueReporter, RunSummary, Settings, Warehouse, WarehousePipeline, DATASETS,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "olistload")]
#[command(about = "Load Olist CSV exports into PostgreSQL, run dbt and report revenue", long_about = None)]
struct Cli {
    /// Directory holding the CSV files (overrides DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// CSV field delimiter (overrides CSV_DELIMITER, default ',')
    #[arg(short, long, global = true, value_parser = delimiter_arg)]
    delimiter: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: extract + load every dataset, dbt build, report
    Run {
        /// Stop after loading the tables
        #[arg(long)]
        skip_transform: bool,

        /// Do not build the revenue report
        #[arg(long)]
        skip_report: bool,

        /// Also write the report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Number of categories in the report
        #[arg(long, default_value_t = DEFAULT_TOP_CATEGORIES)]
        top_categories: usize,
    },

    /// Parse a CSV file and show what would be loaded
    Extract {
        /// Input CSV file
        input: PathBuf,
    },

    /// Extract and load datasets without transforming
    Load {
        /// Only load the dataset for this table
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Run the dbt transformation only
    Transform,

    /// Build the revenue report from the current tables
    Report {
        /// Also write the report as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Number of categories in the report
        #[arg(long, default_value_t = DEFAULT_TOP_CATEGORIES)]
        top_categories: usize,
    },

    /// Show row counts and columns of the destination tables
    Inspect,

    /// List the datasets and their destination tables
    Datasets,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    logs::init();

    let cli = Cli::parse();
    let overrides = Overrides {
        data_dir: cli.data_dir,
        delimiter: cli.delimiter,
    };

    let result = match cli.command {
        Commands::Run {
            skip_transform,
            skip_report,
            report_json,
            top_categories,
        } => {
            let options = PipelineOptions {
                skip_transform,
                skip_report,
                report_json,
            };
            cmd_run(overrides, options, top_categories).await
        }

        Commands::Extract { input } => cmd_extract(
            &input,
            overrides
                .delimiter
                .unwrap_or(olistload::extract::DEFAULT_DELIMITER),
        ),

        Commands::Load { table } => cmd_load(overrides, table.as_deref()).await,

        Commands::Transform => cmd_transform(overrides).await,

        Commands::Report {
            json,
            top_categories,
        } => cmd_report(overrides, json, top_categories).await,

        Commands::Inspect => cmd_inspect(overrides).await,

        Commands::Datasets => cmd_datasets(overrides.data_dir),
    };

    if let Err(e) = result {
        log_error(format!("Pipeline failed: {}", e));
        std::process::exit(1);
    }
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Command-line values that take precedence over the environment.
struct Overrides {
    data_dir: Option<PathBuf>,
    delimiter: Option<u8>,
}

fn delimiter_arg(raw: &str) -> Result<u8, String> {
    parse_delimiter(raw)
        .ok_or_else(|| format!("must be a single ASCII character, got '{}'", raw))
}

fn settings(overrides: Overrides) -> PipelineResult<Settings> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = overrides.data_dir {
        settings.data_dir = dir;
    }
    if let Some(delimiter) = overrides.delimiter {
        settings.delimiter = delimiter;
    }
    Ok(settings)
}

fn build_pipeline(settings: &Settings, top_categories: usize) -> WarehousePipeline {
    let warehouse = Warehouse::new(settings.db.clone());
    Pipeline::new(
        CsvExtractor::new(&settings.data_dir).with_delimiter(settings.delimiter),
        warehouse.clone(),
        DbtRunner::new(settings.dbt.clone()),
        RevenueReporter::new(warehouse).with_top_categories(top_categories),
    )
}

async fn cmd_run(overrides: Overrides, options: PipelineOptions, top_categories: usize) -> CmdResult {
    match run_pipeline(overrides, &options, top_categories).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => match e.stage() {
            Some(stage) => Err(format!("{} stage: {}", stage, e).into()),
            None => Err(e.into()),
        },
    }
}

async fn run_pipeline(
    overrides: Overrides,
    options: &PipelineOptions,
    top_categories: usize,
) -> PipelineResult<RunSummary> {
    let settings = settings(overrides)?;
    log_info(format!("Warehouse: {}", settings.db.redacted_url()));
    log_info(format!("Data directory: {}", settings.data_dir.display()));

    build_pipeline(&settings, top_categories).run(options).await
}

fn print_summary(summary: &RunSummary) {
    println!("Loaded tables:");
    for stats in &summary.loaded {
        println!(
            "  {:<20} {:>10} rows  {:>3} columns",
            stats.table,
            stats.rows,
            stats.columns.len()
        );
    }
    if !summary.transformed {
        println!("Transformation: skipped");
    }
    if let Some(ref report) = summary.report {
        println!();
        print!("{}", report.render());
    }
}

fn cmd_extract(input: &Path, delimiter: u8) -> CmdResult {
    log_info(format!("Parsing CSV: {}", input.display()));
    let parsed = read_csv(input, delimiter)?;
    let batch = &parsed.batch;

    log_info(format!("Encoding: {}", parsed.encoding));
    log_success(format!(
        "Parsed {} rows x {} columns",
        batch.row_count(),
        batch.column_count()
    ));

    for (i, header) in batch.headers.iter().enumerate() {
        let ty = ColumnType::infer(batch.column(i));
        println!("  [{:2}] {:<40} {}", i + 1, header, ty.sql());
    }
    Ok(())
}

async fn cmd_load(overrides: Overrides, table: Option<&str>) -> CmdResult {
    let settings = settings(overrides)?;
    let mut pipeline = WarehousePipeline::from_settings(&settings);

    if let Some(table) = table {
        let dataset =
            dataset_for_table(table).ok_or_else(|| format!("Unknown table: {}", table))?;
        pipeline = pipeline.with_datasets(vec![dataset]);
    }
    let loaded = pipeline.extract_load().await?;

    log_success(format!("Loaded {} table(s)", loaded.len()));
    Ok(())
}

async fn cmd_transform(overrides: Overrides) -> CmdResult {
    let settings = settings(overrides)?;
    WarehousePipeline::from_settings(&settings).transform().await?;
    Ok(())
}

async fn cmd_report(overrides: Overrides, json: Option<PathBuf>, top_categories: usize) -> CmdResult {
    let settings = settings(overrides)?;
    let options = PipelineOptions {
        report_json: json,
        ..PipelineOptions::default()
    };
    let report = build_pipeline(&settings, top_categories)
        .report(&options)
        .await?;
    print!("{}", report.render());
    Ok(())
}

async fn cmd_inspect(overrides: Overrides) -> CmdResult {
    let settings = settings(overrides)?;
    let warehouse = Warehouse::new(settings.db.clone());

    for dataset in DATASETS {
        match warehouse.describe(dataset.table).await? {
            Some(stats) => println!(
                "  {:<20} {:>10} rows  {}",
                stats.table,
                stats.rows,
                stats.columns.join(", ")
            ),
            None => log_warning(format!("{} does not exist", dataset.table)),
        }
    }
    Ok(())
}

fn cmd_datasets(data_dir: Option<PathBuf>) -> CmdResult {
    let data_dir = data_dir
        .or_else(|| std::env::var("DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(olistload::config::DEFAULT_DATA_DIR));

    for dataset in DATASETS {
        println!(
            "  {:<40} -> {}",
            data_dir.join(dataset.file).display(),
            dataset.table
        );
    }
    Ok(())
}
