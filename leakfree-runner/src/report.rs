//! Per-run and per-store reporting.
//!
//! A pipeline run never aborts on one instrument's failure; every instrument
//! ends up in the report with what happened to it.

use chrono::NaiveDate;
use leakfree_core::merge::{Outcome, ProcessError, RunState, SkipReason};
use leakfree_core::normalize::{NormalizationState, ScalerStore, ScalerTransition};
use leakfree_core::store::{ProcessedStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstrumentStatus {
    Processed {
        state: RunState,
        appended_rows: usize,
        dropped_rows: usize,
        late_rows: usize,
        scaler: ScalerTransition,
    },
    AlreadyProcessed {
        persisted_rows: usize,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: String,
    },
}

impl InstrumentStatus {
    pub fn from_result(result: &Result<Outcome, ProcessError>) -> Self {
        match result {
            Ok(Outcome::Processed(r)) => InstrumentStatus::Processed {
                state: r.state,
                appended_rows: r.appended_rows,
                dropped_rows: r.dropped_rows,
                late_rows: r.late_rows,
                scaler: r.scaler,
            },
            Ok(Outcome::AlreadyProcessed { persisted_rows }) => InstrumentStatus::AlreadyProcessed {
                persisted_rows: *persisted_rows,
            },
            Ok(Outcome::Skipped(reason)) => InstrumentStatus::Skipped { reason: *reason },
            Err(e) => InstrumentStatus::Failed {
                error: e.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, InstrumentStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentReport {
    pub instrument_id: String,
    /// Duplicate raw timestamps dropped by the partitioner.
    pub duplicates: usize,
    pub status: InstrumentStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub instruments: Vec<InstrumentReport>,
    /// Raw instruments left out because they are not in the universe.
    pub excluded: Vec<String>,
}

impl PipelineReport {
    pub fn appended_rows(&self) -> usize {
        self.instruments
            .iter()
            .map(|i| match i.status {
                InstrumentStatus::Processed { appended_rows, .. } => appended_rows,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &InstrumentReport> {
        self.instruments.iter().filter(|i| i.status.is_failure())
    }

    pub fn count_where(&self, f: impl Fn(&InstrumentStatus) -> bool) -> usize {
        self.instruments.iter().filter(|i| f(&i.status)).count()
    }

    pub fn get(&self, instrument_id: &str) -> Option<&InstrumentReport> {
        self.instruments
            .iter()
            .find(|i| i.instrument_id == instrument_id)
    }

    /// Plain-text table for the CLI.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<10} {:<18} {:>8} {:>8} {:>6}", "instrument", "status", "appended", "dropped", "late");
        for i in &self.instruments {
            let (status, appended, dropped, late) = match &i.status {
                InstrumentStatus::Processed {
                    state,
                    appended_rows,
                    dropped_rows,
                    late_rows,
                    ..
                } => {
                    let s = match state {
                        RunState::FullRun => "full",
                        RunState::IncrementalRun => "incremental",
                    };
                    (s.to_string(), *appended_rows, *dropped_rows, *late_rows)
                }
                InstrumentStatus::AlreadyProcessed { .. } => ("already processed".into(), 0, 0, 0),
                InstrumentStatus::Skipped { .. } => ("skipped".into(), 0, 0, 0),
                InstrumentStatus::Failed { error } => (format!("FAILED: {error}"), 0, 0, 0),
            };
            let _ = writeln!(
                out,
                "{:<10} {:<18} {:>8} {:>8} {:>6}",
                i.instrument_id, status, appended, dropped, late
            );
        }
        let _ = writeln!(
            out,
            "{} instruments, {} rows appended, {} failed",
            self.instruments.len(),
            self.appended_rows(),
            self.failures().count()
        );
        out
    }
}

// ─── Store status ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub instrument_id: String,
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    /// Last timestamp of the scaler's fit data; `None` when unfit.
    pub scaler_fitted_through: Option<NaiveDate>,
}

/// Persisted row count, date range and scaler state per instrument.
pub fn store_status(
    store: &dyn ProcessedStore,
    scalers: &dyn ScalerStore,
) -> Result<Vec<StoreStatus>, StoreError> {
    let mut out = Vec::new();
    for id in store.instruments()? {
        let keys = store.keys(&id)?;
        let scaler = scalers.load(&id)?;
        out.push(StoreStatus {
            rows: keys.len(),
            first_date: keys.first().copied(),
            last_date: keys.last().copied(),
            scaler_fitted_through: scaler.as_fit().map(|s| s.fitted_through),
            instrument_id: id,
        });
    }
    Ok(out)
}

/// Fitted scaler state of every persisted instrument, for auditing stored
/// rows. Instruments without a state are left out.
pub fn persisted_scalers(
    store: &dyn ProcessedStore,
    scalers: &dyn ScalerStore,
) -> Result<BTreeMap<String, NormalizationState>, StoreError> {
    let mut out = BTreeMap::new();
    for id in store.instruments()? {
        if let Some(state) = scalers.load(&id)?.as_fit() {
            out.insert(id, state.clone());
        }
    }
    Ok(out)
}
