//! Causal split engine: walk-forward folds and holdout splits.
//!
//! Splits operate on the ordered set of distinct timestamps, then assign rows
//! by timestamp. Every training timestamp strictly precedes every test
//! timestamp, globally and therefore per instrument.

use crate::domain::FeatureRow;
use crate::store::ProcessedDataset;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("insufficient data: {timestamps} timestamps < {required} required")]
    InsufficientData { timestamps: usize, required: usize },

    #[error("fold count must be at least 1, got {0}")]
    InvalidFoldCount(usize),

    #[error("train fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),
}

// ─── Fold specs ──────────────────────────────────────────────────────

/// Timestamp index ranges of one fold. Ends are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    pub fold_index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

impl FoldSpec {
    pub fn train_len(&self) -> usize {
        self.train_end - self.train_start
    }

    pub fn test_len(&self) -> usize {
        self.test_end - self.test_start
    }
}

/// Expanding-window folds over `n` ordered timestamps.
///
/// With `test_size = n / (k + 1)`, fold *i* trains on the first
/// `n - (k - i) * test_size` timestamps and tests on the next `test_size`.
/// The last fold therefore ends at `n`.
pub fn create_folds(n: usize, k: usize) -> Result<Vec<FoldSpec>, SplitError> {
    if k == 0 {
        return Err(SplitError::InvalidFoldCount(k));
    }
    if n < k + 1 {
        return Err(SplitError::InsufficientData {
            timestamps: n,
            required: k + 1,
        });
    }
    let test_size = n / (k + 1);
    Ok((0..k)
        .map(|i| {
            let train_end = n - (k - i) * test_size;
            FoldSpec {
                fold_index: i,
                train_start: 0,
                train_end,
                test_start: train_end,
                test_end: train_end + test_size,
            }
        })
        .collect())
}

/// A single train/test split at `floor(n * train_fraction)` timestamps.
pub fn create_holdout(n: usize, train_fraction: f64) -> Result<FoldSpec, SplitError> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(SplitError::InvalidFraction(train_fraction));
    }
    let train_end = (n as f64 * train_fraction).floor() as usize;
    if train_end == 0 || train_end >= n {
        return Err(SplitError::InsufficientData {
            timestamps: n,
            required: 2,
        });
    }
    Ok(FoldSpec {
        fold_index: 0,
        train_start: 0,
        train_end,
        test_start: train_end,
        test_end: n,
    })
}

// ─── Materialized folds ──────────────────────────────────────────────

/// Inclusive date bounds of a fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldBounds {
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

/// Train and test rows of one fold, each ordered by (timestamp, instrument).
#[derive(Debug, Clone, PartialEq)]
pub struct SplitFold {
    pub fold_index: usize,
    pub bounds: FoldBounds,
    pub train_rows: Vec<FeatureRow>,
    pub test_rows: Vec<FeatureRow>,
}

impl SplitFold {
    /// Instruments appearing on either side.
    pub fn instruments(&self) -> BTreeSet<&str> {
        self.train_rows
            .iter()
            .chain(&self.test_rows)
            .map(|r| r.instrument_id.as_str())
            .collect()
    }

    pub fn train_for<'a>(&'a self, instrument_id: &'a str) -> impl Iterator<Item = &'a FeatureRow> {
        self.train_rows
            .iter()
            .filter(move |r| r.instrument_id == instrument_id)
    }

    pub fn test_for<'a>(&'a self, instrument_id: &'a str) -> impl Iterator<Item = &'a FeatureRow> {
        self.test_rows
            .iter()
            .filter(move |r| r.instrument_id == instrument_id)
    }

    pub fn max_train_timestamp(&self) -> Option<NaiveDate> {
        self.train_rows.iter().map(|r| r.timestamp).max()
    }

    pub fn min_test_timestamp(&self) -> Option<NaiveDate> {
        self.test_rows.iter().map(|r| r.timestamp).min()
    }
}

fn materialize(
    dataset: &ProcessedDataset,
    timestamps: &[NaiveDate],
    spec: &FoldSpec,
) -> SplitFold {
    let train_from = timestamps[spec.train_start];
    let train_to = timestamps[spec.train_end - 1];
    let test_from = timestamps[spec.test_start];
    let test_to = timestamps[spec.test_end - 1];

    let mut train_rows = Vec::new();
    let mut test_rows = Vec::new();
    for row in dataset.interleaved() {
        if row.timestamp >= train_from && row.timestamp <= train_to {
            train_rows.push(row.clone());
        } else if row.timestamp >= test_from && row.timestamp <= test_to {
            test_rows.push(row.clone());
        }
    }

    SplitFold {
        fold_index: spec.fold_index,
        bounds: FoldBounds {
            train_start: train_from,
            train_end: train_to,
            test_start: test_from,
            test_end: test_to,
        },
        train_rows,
        test_rows,
    }
}

/// `k` walk-forward folds over the dataset's distinct timestamps.
///
/// No partial folds: on error nothing is produced.
pub fn walk_forward(dataset: &ProcessedDataset, k: usize) -> Result<Vec<SplitFold>, SplitError> {
    let timestamps = dataset.timestamps();
    let specs = create_folds(timestamps.len(), k)?;
    Ok(specs
        .iter()
        .map(|spec| materialize(dataset, &timestamps, spec))
        .collect())
}

/// The production train/test pair: the last of `k` walk-forward folds.
pub fn final_split(dataset: &ProcessedDataset, k: usize) -> Result<SplitFold, SplitError> {
    let timestamps = dataset.timestamps();
    let specs = create_folds(timestamps.len(), k)?;
    let last = specs
        .last()
        .ok_or(SplitError::InvalidFoldCount(k))?;
    Ok(materialize(dataset, &timestamps, last))
}

/// Exact fractional split: the first `train_fraction` of timestamps train.
pub fn holdout(dataset: &ProcessedDataset, train_fraction: f64) -> Result<SplitFold, SplitError> {
    let timestamps = dataset.timestamps();
    let spec = create_holdout(timestamps.len(), train_fraction)?;
    Ok(materialize(dataset, &timestamps, &spec))
}
