//! Pipeline orchestration: partition, then process instruments in parallel.
//!
//! Instruments are independent, so each one runs on its own rayon task
//! through the shared [`MergeController`]. A failure is recorded against its
//! instrument and never aborts the others.

use crate::config::PipelineConfig;
use crate::report::{InstrumentReport, InstrumentStatus, PipelineReport};
use leakfree_core::data::{partition, SchemaError, Universe};
use leakfree_core::domain::{InstrumentSeries, RawDataset};
use leakfree_core::merge::{MergeController, ProcessOptions};
use leakfree_core::normalize::JsonScalerStore;
use leakfree_core::store::ParquetStore;
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

pub struct Pipeline {
    controller: MergeController,
    options: ProcessOptions,
    threads: usize,
}

impl Pipeline {
    pub fn new(controller: MergeController, options: ProcessOptions, threads: usize) -> Self {
        Self {
            controller,
            options,
            threads,
        }
    }

    /// Pipeline over the on-disk stores named by `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let dir = &config.paths.processed_dir;
        let controller = MergeController::new(
            Arc::new(ParquetStore::new(dir)),
            Arc::new(JsonScalerStore::new(dir)),
        );
        Self::new(controller, config.process_options(), config.process.threads)
    }

    pub fn controller(&self) -> &MergeController {
        &self.controller
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Process every instrument of `dataset`, or only those in `universe`.
    ///
    /// A schema error in the dataset as a whole halts the run; anything
    /// per-instrument lands in the report.
    pub fn run(
        &self,
        dataset: &RawDataset,
        universe: Option<&Universe>,
    ) -> Result<PipelineReport, PipelineError> {
        let parts = partition(dataset)?;

        let mut excluded = Vec::new();
        let mut selected: Vec<(&InstrumentSeries, usize)> = Vec::new();
        for id in parts.instruments() {
            if universe.is_some_and(|u| !u.tickers().iter().any(|t| t == id)) {
                excluded.push(id.to_string());
                continue;
            }
            if let Some(series) = parts.get(id) {
                let duplicates = parts.duplicates.get(id).copied().unwrap_or(0);
                selected.push((series, duplicates));
            }
        }
        info!(
            instruments = selected.len(),
            excluded = excluded.len(),
            duplicates = parts.total_duplicates(),
            "processing started"
        );

        let process = |(series, duplicates): &(&InstrumentSeries, usize)| {
            let result = self.controller.process_instrument(series, &self.options);
            if let Err(e) = &result {
                error!(instrument = %series.instrument_id, error = %e, "instrument failed");
            }
            InstrumentReport {
                instrument_id: series.instrument_id.clone(),
                duplicates: *duplicates,
                status: InstrumentStatus::from_result(&result),
            }
        };

        let instruments: Vec<InstrumentReport> = if self.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;
            pool.install(|| selected.par_iter().map(process).collect())
        } else {
            selected.par_iter().map(process).collect()
        };

        let report = PipelineReport {
            instruments,
            excluded,
        };
        info!(
            instruments = report.instruments.len(),
            appended = report.appended_rows(),
            failed = report.failures().count(),
            "processing finished"
        );
        Ok(report)
    }
}
