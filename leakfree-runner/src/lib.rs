//! Leakfree Runner: pipeline orchestration.
//!
//! This crate builds on `leakfree-core` to provide:
//! - TOML pipeline configuration
//! - Raw CSV ingestion and raw-data providers (CSV file, synthetic)
//! - Parallel per-instrument processing with failure isolation
//! - CSV export of processed data and train/test splits
//! - Model-trainer contract and classification metrics
//! - JSONL run history

pub mod config;
pub mod export;
pub mod history;
pub mod ingest;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod training;

pub use config::{ConfigError, PipelineConfig};
pub use history::{dataset_hash, HistoryEntry, RunHistory};
pub use ingest::{read_raw_csv, IngestError};
pub use pipeline::{Pipeline, PipelineError};
pub use provider::{load_universe, BatchLoad, CsvFileProvider, SyntheticProvider};
pub use report::{persisted_scalers, store_status, InstrumentStatus, PipelineReport, StoreStatus};
pub use training::{ClassificationMetrics, Classifier, MajorityClass, TrainError, TrainingSet};
