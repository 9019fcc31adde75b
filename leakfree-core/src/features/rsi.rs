//! RSI_14 with Wilder smoothing.
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Edge cases: no movement → 50; avg_loss == 0 → 100; avg_gain == 0 → 0.
//!
//! Wilder smoothing is path dependent: the value at t depends on every close
//! since the series started, so the lookback is unbounded.

use super::{closes, Feature, Lookback};
use crate::domain::{Column, RawRecord};

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub const PERIOD: usize = 14;

    pub fn new() -> Self {
        Self {
            period: Self::PERIOD,
        }
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for Rsi {
    fn column(&self) -> Column {
        Column::Rsi14
    }

    fn lookback(&self) -> Lookback {
        Lookback::Unbounded
    }

    fn compute(&self, records: &[RawRecord]) -> Vec<f64> {
        wilder_rsi(&closes(records), self.period)
    }
}

/// Wilder RSI over `closes`. Leading NaN closes are skipped; the seed window
/// starts at the first valid close.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    let Some(start) = closes.iter().position(|c| !c.is_nan()) else {
        return result;
    };
    if period == 0 || n - start < period + 1 {
        return result;
    }

    let mut changes = vec![f64::NAN; n];
    for i in (start + 1)..n {
        changes[i] = closes[i] - closes[i - 1];
    }

    // Seed: simple average of the first `period` changes
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for &ch in &changes[(start + 1)..=(start + period)] {
        if ch.is_nan() {
            return result;
        }
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[start + period] = compute_rsi(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (start + period + 1)..n {
        if changes[i].is_nan() {
            // the smoothed state is lost; nothing after this is defined
            return result;
        }
        let gain = changes[i].max(0.0);
        let loss = (-changes[i]).max(0.0);
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        result[i] = compute_rsi(avg_gain, avg_loss);
    }
    result
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
