//! Leakfree CLI: process, split, validate, synth and status commands.
//!
//! Commands:
//! - `process`: partition raw data and run every instrument through the
//!   incremental merge controller
//! - `split`: export the processed dataset and the final train/test split,
//!   optionally evaluating a model on it
//! - `validate`: audit the processed dataset and its walk-forward folds
//! - `synth`: write a synthetic raw dataset for demos
//! - `status`: report persisted rows and scaler state per instrument

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use leakfree_core::data::Universe;
use leakfree_core::domain::RawDataset;
use leakfree_core::merge::RunMode;
use leakfree_core::split::{final_split, holdout, walk_forward, SplitFold};
use leakfree_core::store::ProcessedDataset;
use leakfree_core::validate::PipelineValidator;
use leakfree_runner::config::PipelineConfig;
use leakfree_runner::export::{export_processed_csv, export_raw_csv, write_file, write_split};
use leakfree_runner::history::{dataset_hash, HistoryEntry, RunHistory};
use leakfree_runner::ingest::read_raw_csv;
use leakfree_runner::pipeline::Pipeline;
use leakfree_runner::provider::{load_universe, SyntheticProvider};
use leakfree_runner::report::{persisted_scalers, store_status};
use leakfree_runner::training::{
    train_and_evaluate, Classifier, MajorityClass, TrainingSet,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "leakfree",
    about = "Leakage-safe feature processing and validation for stock-direction data"
)]
struct Cli {
    /// Path to a TOML pipeline config. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process raw data into the persisted, normalized dataset.
    Process {
        /// Raw CSV. Defaults to `paths.raw` from the config.
        #[arg(long)]
        raw: Option<PathBuf>,

        /// Ticker universe file restricting which instruments are processed.
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Process from scratch instead of appending.
        #[arg(long, default_value_t = false)]
        fresh: bool,

        /// With --fresh, replace persisted rows.
        #[arg(long, default_value_t = false)]
        overwrite: bool,

        /// With --fresh --overwrite, fit a new scaler.
        #[arg(long, default_value_t = false)]
        refit_scaler: bool,
    },
    /// Export the processed dataset and the final train/test split.
    Split {
        /// Exact holdout train fraction instead of the final walk-forward fold.
        #[arg(long)]
        holdout: Option<f64>,

        /// Fit and evaluate the majority-class baseline on the split.
        #[arg(long, default_value_t = false)]
        train: bool,
    },
    /// Audit the processed dataset and its walk-forward folds.
    Validate {
        /// Audit folds against the persisted scalers instead of fold-local ones.
        #[arg(long, default_value_t = false)]
        persisted_scalers: bool,
    },
    /// Write a synthetic raw dataset.
    Synth {
        /// Tickers to generate (e.g., SPY QQQ AAPL).
        #[arg(required_unless_present = "universe")]
        tickers: Vec<String>,

        /// Ticker universe file, instead of listing tickers.
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Start date (YYYY-MM-DD).
        #[arg(long, default_value = "2019-01-02")]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long, default_value = "2023-12-29")]
        end: String,

        /// Output CSV. Defaults to `paths.raw` from the config.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Report persisted rows, date range and scaler state per instrument.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Process {
            raw,
            universe,
            fresh,
            overwrite,
            refit_scaler,
        } => {
            let mut config = config;
            if fresh {
                config.process.mode = RunMode::Fresh;
            }
            config.process.overwrite |= overwrite;
            config.process.refit_scaler |= refit_scaler;
            if let Some(raw) = raw {
                config.paths.raw = raw;
            }
            if let Some(universe) = universe {
                config.paths.universe = Some(universe);
            }
            config.validate().context("invalid process options")?;
            run_process(&config)
        }
        Commands::Split { holdout, train } => run_split(&config, holdout, train),
        Commands::Validate { persisted_scalers } => run_validate(&config, persisted_scalers),
        Commands::Synth {
            tickers,
            universe,
            start,
            end,
            out,
        } => {
            let out = out.unwrap_or_else(|| config.paths.raw.clone());
            run_synth(tickers, universe.as_deref(), &start, &end, &out)
        }
        Commands::Status => run_status(&config),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

// ─── process ────────────────────────────────────────────────────────

fn run_process(config: &PipelineConfig) -> Result<()> {
    let raw = read_raw_csv(&config.paths.raw)
        .with_context(|| format!("failed to read raw data {}", config.paths.raw.display()))?;
    let universe = config
        .paths
        .universe
        .as_deref()
        .map(Universe::from_file)
        .transpose()
        .context("failed to load universe")?;

    let pipeline = Pipeline::from_config(config);
    let report = pipeline.run(&raw, universe.as_ref())?;
    print!("{}", report.render());
    if !report.excluded.is_empty() {
        println!("Outside universe: {}", report.excluded.join(", "));
    }

    let entry = HistoryEntry {
        timestamp: Utc::now().naive_utc(),
        dataset_hash: dataset_hash(&raw),
        config_hash: config.config_hash()?,
        options: *pipeline.options(),
        report,
    };
    RunHistory::new(&config.paths.history)
        .append(&entry)
        .with_context(|| format!("failed to append history {}", config.paths.history.display()))?;

    let failed = entry.report.failures().count();
    if failed > 0 {
        bail!("{failed} instrument(s) failed");
    }
    Ok(())
}

// ─── split ──────────────────────────────────────────────────────────

fn load_processed(config: &PipelineConfig) -> Result<(Pipeline, ProcessedDataset)> {
    let pipeline = Pipeline::from_config(config);
    let dataset = pipeline
        .controller()
        .store()
        .load_all()
        .with_context(|| format!("failed to load {}", config.paths.processed_dir.display()))?;
    if dataset.is_empty() {
        bail!(
            "no processed data in {}; run `leakfree process` first",
            config.paths.processed_dir.display()
        );
    }
    Ok((pipeline, dataset))
}

fn run_split(config: &PipelineConfig, holdout_fraction: Option<f64>, train: bool) -> Result<()> {
    let (_, dataset) = load_processed(config)?;
    let columns = dataset.columns();

    let processed_path = config.paths.export_dir.join("processed_data.csv");
    write_file(&processed_path, &export_processed_csv(&dataset)?)?;
    println!("Processed data: {} rows -> {}", dataset.len(), processed_path.display());

    let fold = match holdout_fraction.or(config.split.holdout_fraction) {
        Some(fraction) => holdout(&dataset, fraction)?,
        None => final_split(&dataset, config.split.n_folds)?,
    };
    let (train_path, test_path) = write_split(&fold, &columns, &config.paths.export_dir)?;
    print_fold(&fold);
    println!("Train: {}", train_path.display());
    println!("Test:  {}", test_path.display());

    if train {
        evaluate(&fold, &dataset)?;
    }
    Ok(())
}

fn print_fold(fold: &SplitFold) {
    let b = &fold.bounds;
    println!(
        "Train {} to {} ({} rows), test {} to {} ({} rows)",
        b.train_start,
        b.train_end,
        fold.train_rows.len(),
        b.test_start,
        b.test_end,
        fold.test_rows.len()
    );
}

fn evaluate(fold: &SplitFold, dataset: &ProcessedDataset) -> Result<()> {
    if !dataset.has_label() {
        bail!("processed dataset has no label column; use the feature_engineered set");
    }
    let columns = dataset.columns();
    let train = TrainingSet::from_rows(&fold.train_rows, &columns)?;
    let test = TrainingSet::from_rows(&fold.test_rows, &columns)?;
    println!(
        "Training on {} rows ({} positive, scale_pos_weight {:.3})",
        train.len(),
        train.positives(),
        train.scale_pos_weight()
    );

    let mut model = MajorityClass::new();
    let metrics = train_and_evaluate(&mut model, &train, &test)?;
    println!();
    println!("=== {} ===", model.name());
    println!("{}", metrics.render());
    Ok(())
}

// ─── validate ───────────────────────────────────────────────────────

fn run_validate(config: &PipelineConfig, use_persisted: bool) -> Result<()> {
    let (pipeline, dataset) = load_processed(config)?;
    let controller = pipeline.controller();
    let scalers = persisted_scalers(controller.store(), controller.scalers())?;
    let validator = PipelineValidator::new(config.validation);

    let mut report = validator.audit_dataset(&dataset, &scalers);
    let folds = walk_forward(&dataset, config.split.n_folds)?;
    info!(folds = folds.len(), "auditing walk-forward folds");
    let fold_report = if use_persisted {
        validator.audit_folds(&folds, &scalers)
    } else {
        validator.audit_folds_fold_local(&folds)
    };
    report.merge(fold_report);

    print!("{}", report.render());
    if report.has_fatal() {
        bail!("validation found fatal issues");
    }
    Ok(())
}

// ─── synth ──────────────────────────────────────────────────────────

fn run_synth(
    tickers: Vec<String>,
    universe: Option<&Path>,
    start: &str,
    end: &str,
    out: &Path,
) -> Result<()> {
    let universe = match universe {
        Some(path) => Universe::from_file(path)?,
        None => Universe::from_tickers(&tickers)?,
    };
    let start = parse_date(start)?;
    let end = parse_date(end)?;

    let load = load_universe(&SyntheticProvider::new(), &universe, start, end);
    for (ticker, err) in &load.failed {
        eprintln!("Error for {ticker}: {err}");
    }
    write_dataset(&load.dataset, out)?;
    println!(
        "Wrote {} rows for {} instrument(s) to {}",
        load.dataset.len(),
        universe.len() - load.skipped.len() - load.failed.len(),
        out.display()
    );
    Ok(())
}

fn write_dataset(dataset: &RawDataset, out: &Path) -> Result<()> {
    write_file(out, &export_raw_csv(dataset)?)
}

// ─── status ─────────────────────────────────────────────────────────

fn run_status(config: &PipelineConfig) -> Result<()> {
    let pipeline = Pipeline::from_config(config);
    let controller = pipeline.controller();
    let status = store_status(controller.store(), controller.scalers())?;

    if status.is_empty() {
        println!("No processed data in {}", config.paths.processed_dir.display());
        return Ok(());
    }

    println!("Processed: {}", config.paths.processed_dir.display());
    println!();
    println!(
        "{:<10} {:>8} {:<25} {:<14}",
        "Instrument", "Rows", "Date Range", "Scaler Fit To"
    );
    println!("{}", "-".repeat(60));
    for s in &status {
        let range = match (s.first_date, s.last_date) {
            (Some(a), Some(b)) => format!("{a} to {b}"),
            _ => "-".into(),
        };
        let fitted = s
            .scaler_fitted_through
            .map_or_else(|| "unfit".to_string(), |d| d.to_string());
        println!("{:<10} {:>8} {:<25} {:<14}", s.instrument_id, s.rows, range, fitted);
    }

    let history = RunHistory::new(&config.paths.history).read_all()?;
    if let Some(last) = history.last() {
        println!();
        println!(
            "Last run: {} ({} instruments, {} rows appended)",
            last.timestamp.format("%Y-%m-%d %H:%M:%S"),
            last.report.instruments.len(),
            last.report.appended_rows()
        );
    }
    Ok(())
}
