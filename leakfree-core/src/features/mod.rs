//! Feature engine: causal derived columns and the forward label.
//!
//! Every feature is a pure function of an instrument's raw records, producing
//! a series of the same length with NaN during warmup. No value at t may read
//! a close later than t; the label generator is the single exception and is
//! kept out of `Feature` entirely.

pub mod engine;
pub mod label;
pub mod lag_return;
pub mod log_return;
pub mod rsi;
pub mod series;
pub mod sma;

pub use engine::FeatureEngine;
pub use label::generate_labels;
pub use lag_return::LaggedReturn;
pub use log_return::LogReturn;
pub use rsi::Rsi;
pub use sma::MovingAverage;

use crate::domain::{Column, RawRecord};
use serde::{Deserialize, Serialize};

/// How much trailing history a feature needs to reproduce its full-series
/// value at a given row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookback {
    /// The value at t depends on at most `n` prior records.
    Bounded(usize),
    /// The value at t depends on the whole history (recursive smoothing).
    Unbounded,
}

impl Lookback {
    pub fn max(self, other: Lookback) -> Lookback {
        match (self, other) {
            (Lookback::Bounded(a), Lookback::Bounded(b)) => Lookback::Bounded(a.max(b)),
            _ => Lookback::Unbounded,
        }
    }
}

/// A derived column computed from an instrument's raw records.
pub trait Feature: Send + Sync {
    /// Output column.
    fn column(&self) -> Column;

    fn lookback(&self) -> Lookback;

    /// Compute the feature for the whole slice. Output has `records.len()`
    /// entries; undefined positions are NaN.
    fn compute(&self, records: &[RawRecord]) -> Vec<f64>;
}

/// Which variant of the processing to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureSet {
    /// Raw columns only, normalized; no derived columns and no label.
    Basic,
    /// Derived columns plus the label.
    FeatureEngineered { rsi: bool },
}

impl FeatureSet {
    pub fn has_label(self) -> bool {
        matches!(self, FeatureSet::FeatureEngineered { .. })
    }

    /// Feature implementations enabled by this set, in output order.
    pub fn features(self) -> Vec<Box<dyn Feature>> {
        match self {
            FeatureSet::Basic => Vec::new(),
            FeatureSet::FeatureEngineered { rsi } => {
                let mut features: Vec<Box<dyn Feature>> = vec![
                    Box::new(MovingAverage::new()),
                    Box::new(LaggedReturn),
                    Box::new(LogReturn),
                ];
                if rsi {
                    features.push(Box::new(Rsi::new()));
                }
                features
            }
        }
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        FeatureSet::FeatureEngineered { rsi: true }
    }
}

pub(crate) fn closes(records: &[RawRecord]) -> Vec<f64> {
    records.iter().map(|r| r.close()).collect()
}

/// Records with the given closes on consecutive days, for tests.
#[cfg(test)]
pub fn make_records(closes: &[f64]) -> Vec<RawRecord> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            RawRecord::new("TEST", base + chrono::Duration::days(i as i64))
                .with(Column::Close, close)
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
