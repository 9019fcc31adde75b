//! SMA_20: rolling mean of close.
//!
//! Realized feature. The value at t uses closes t-19..=t and needs a full
//! window (minimum 20 observations).

use super::{closes, series, Feature, Lookback};
use crate::domain::{Column, RawRecord};

#[derive(Debug, Clone)]
pub struct MovingAverage {
    period: usize,
}

impl MovingAverage {
    pub const PERIOD: usize = 20;

    pub fn new() -> Self {
        Self {
            period: Self::PERIOD,
        }
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for MovingAverage {
    fn column(&self) -> Column {
        Column::Sma20
    }

    fn lookback(&self) -> Lookback {
        Lookback::Bounded(self.period - 1)
    }

    fn compute(&self, records: &[RawRecord]) -> Vec<f64> {
        series::rolling_mean(&closes(records), self.period)
    }
}
