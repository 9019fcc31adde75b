//! Incremental merge controller.
//!
//! Per instrument, a two-state machine:
//! - `FullRun`: nothing persisted yet. Compute, resolve, fit the scaler,
//!   persist everything.
//! - `IncrementalRun`: rows persisted. Feed the feature engine the new raw
//!   records plus enough trailing history for its lookback, keep only rows
//!   later than the last persisted timestamp, scale them with the persisted
//!   state, append.
//!
//! Persisted rows are never recomputed or reordered. The only sanctioned
//! rewrite is a fresh run with `overwrite` set.

use crate::data::SchemaError;
use crate::domain::{FeatureRow, InstrumentSeries, RawRecord};
use crate::features::{FeatureEngine, FeatureSet, Lookback};
use crate::normalize::{normalize_rows, NormalizeError, ScalerState, ScalerStore, ScalerTransition};
use crate::resolve::{forward_fill_raw, MissingDataResolver};
use crate::store::{InstrumentLocks, ProcessedStore, StoreError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Process from scratch. A no-op if rows are already persisted, unless
    /// `overwrite` is set.
    Fresh,
    /// Append only what is new since the last persisted timestamp.
    #[default]
    Incremental,
}

/// Explicit per-call configuration. Nothing is inferred from the presence
/// of files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub feature_set: FeatureSet,
    pub mode: RunMode,
    pub overwrite: bool,
    pub refit_scaler: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            feature_set: FeatureSet::default(),
            mode: RunMode::Incremental,
            overwrite: false,
            refit_scaler: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    FullRun,
    IncrementalRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Every row had an undefined value after forward-fill.
    EmptyAfterCleaning,
}

/// Result of processing one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedReport {
    pub state: RunState,
    pub appended_rows: usize,
    /// Candidate rows removed by the missing-data resolver.
    pub dropped_rows: usize,
    /// Raw rows older than the last persisted timestamp that were never
    /// persisted. Append-only ordering keeps them out.
    pub late_rows: usize,
    pub scaler: ScalerTransition,
    /// The rows written by this call, normalized.
    pub rows: Vec<FeatureRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Processed(ProcessedReport),
    /// Rows already persisted and the caller asked for a fresh run without
    /// `overwrite`. Not an error.
    AlreadyProcessed { persisted_rows: usize },
    Skipped(SkipReason),
}

impl Outcome {
    pub fn appended_rows(&self) -> usize {
        match self {
            Outcome::Processed(r) => r.appended_rows,
            _ => 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("refit of '{instrument}' requires a fresh run with overwrite")]
    RefitRequiresOverwrite { instrument: String },

    #[error("'{instrument}' has persisted rows but no scaler state")]
    MissingScaler { instrument: String },
}

pub struct MergeController {
    store: Arc<dyn ProcessedStore>,
    scalers: Arc<dyn ScalerStore>,
    locks: InstrumentLocks,
}

impl MergeController {
    pub fn new(store: Arc<dyn ProcessedStore>, scalers: Arc<dyn ScalerStore>) -> Self {
        Self {
            store,
            scalers,
            locks: InstrumentLocks::new(),
        }
    }

    pub fn store(&self) -> &dyn ProcessedStore {
        self.store.as_ref()
    }

    pub fn scalers(&self) -> &dyn ScalerStore {
        self.scalers.as_ref()
    }

    /// Process one instrument. Holds that instrument's lock for the whole
    /// read-compute-write cycle.
    pub fn process_instrument(
        &self,
        series: &InstrumentSeries,
        opts: &ProcessOptions,
    ) -> Result<Outcome, ProcessError> {
        let id = series.instrument_id.as_str();
        let handle = self.locks.handle(id);
        let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);

        let last = self.store.last_timestamp(id)?;
        let rewrite = last.is_none() || (opts.mode == RunMode::Fresh && opts.overwrite);
        if opts.refit_scaler && !rewrite {
            return Err(ProcessError::RefitRequiresOverwrite {
                instrument: id.to_string(),
            });
        }

        let mut records = series.records.clone();
        forward_fill_raw(&mut records, &series.columns);
        let engine = FeatureEngine::new(opts.feature_set);
        let resolver = MissingDataResolver::new(opts.feature_set.has_label());

        let outcome = match (last, opts.mode) {
            (Some(_), RunMode::Fresh) if !opts.overwrite => {
                let persisted_rows = self.store.row_count(id)?;
                info!(instrument = %id, rows = persisted_rows, "already processed");
                Outcome::AlreadyProcessed { persisted_rows }
            }
            (Some(last), RunMode::Incremental) => {
                self.incremental(series, &records, last, &engine, resolver)?
            }
            (last, _) => {
                let replace = last.is_some();
                let rows = engine.compute_window(id, &series.columns, &records)?;
                let resolution = resolver.resolve(rows);
                if resolution.is_empty() {
                    warn!(instrument = %id, "skipped: no rows left after cleaning");
                    return Ok(Outcome::Skipped(SkipReason::EmptyAfterCleaning));
                }
                let mut rows = resolution.rows;
                let transition = self.normalize(id, &mut rows, opts.refit_scaler)?;
                if replace {
                    self.store.replace(id, &rows)?;
                } else {
                    self.store.append(id, &rows)?;
                }
                info!(
                    instrument = %id,
                    rows = rows.len(),
                    dropped = resolution.dropped,
                    replaced = replace,
                    "full run persisted"
                );
                Outcome::Processed(ProcessedReport {
                    state: RunState::FullRun,
                    appended_rows: rows.len(),
                    dropped_rows: resolution.dropped,
                    late_rows: 0,
                    scaler: transition,
                    rows,
                })
            }
        };
        Ok(outcome)
    }

    fn incremental(
        &self,
        series: &InstrumentSeries,
        records: &[RawRecord],
        last: NaiveDate,
        engine: &FeatureEngine,
        resolver: MissingDataResolver,
    ) -> Result<Outcome, ProcessError> {
        let id = series.instrument_id.as_str();
        let state = match self.scalers.load(id)? {
            ScalerState::Fit(state) => state,
            ScalerState::Unfit => {
                return Err(ProcessError::MissingScaler {
                    instrument: id.to_string(),
                })
            }
        };

        let first_new = records.partition_point(|r| r.timestamp <= last);
        let keys = self.store.keys(id)?;
        let first_persisted = keys.iter().next().copied();
        let late_rows = records[..first_new]
            .iter()
            .filter(|r| {
                first_persisted.is_some_and(|f| r.timestamp > f) && !keys.contains(&r.timestamp)
            })
            .count();
        if late_rows > 0 {
            warn!(instrument = %id, late_rows, "raw rows older than persisted output were not appended");
        }

        let candidates = records.len() - first_new;
        if candidates == 0 {
            debug!(instrument = %id, "no new rows");
            return Ok(Outcome::Processed(ProcessedReport {
                state: RunState::IncrementalRun,
                appended_rows: 0,
                dropped_rows: 0,
                late_rows,
                scaler: ScalerTransition::Reused,
                rows: Vec::new(),
            }));
        }

        let start = match engine.lookback() {
            Lookback::Bounded(n) => first_new.saturating_sub(n),
            Lookback::Unbounded => 0,
        };
        let window = engine.compute_window(id, &series.columns, &records[start..])?;
        let mut rows: Vec<FeatureRow> = resolver
            .resolve(window)
            .rows
            .into_iter()
            .filter(|r| r.timestamp > last)
            .collect();
        let dropped_rows = candidates - rows.len();

        let (_, transition) = normalize_rows(id, ScalerState::Fit(state), false, &mut rows)?;
        self.store.append(id, &rows)?;
        info!(
            instrument = %id,
            appended = rows.len(),
            window = records.len() - start,
            "incremental run appended"
        );

        Ok(Outcome::Processed(ProcessedReport {
            state: RunState::IncrementalRun,
            appended_rows: rows.len(),
            dropped_rows,
            late_rows,
            scaler: transition,
            rows,
        }))
    }

    /// Run the scaler state machine and persist any new state before the rows
    /// that depend on it.
    fn normalize(
        &self,
        id: &str,
        rows: &mut [FeatureRow],
        refit: bool,
    ) -> Result<ScalerTransition, ProcessError> {
        let current = self.scalers.load(id)?;
        let (state, transition) = normalize_rows(id, current, refit, rows)?;
        if transition != ScalerTransition::Reused {
            self.scalers.save(&state)?;
        }
        Ok(transition)
    }
}
