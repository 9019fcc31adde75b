//! Log_Return: `ln(close[t] / close[t-1])`.
//!
//! Realized feature. It describes day t's own move and is meant for
//! volatility characterization; it is not a shifted predictor.

use super::{closes, series, Feature, Lookback};
use crate::domain::{Column, RawRecord};

#[derive(Debug, Clone, Default)]
pub struct LogReturn;

impl Feature for LogReturn {
    fn column(&self) -> Column {
        Column::LogReturn
    }

    fn lookback(&self) -> Lookback {
        Lookback::Bounded(1)
    }

    fn compute(&self, records: &[RawRecord]) -> Vec<f64> {
        series::log_return(&closes(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, make_records, DEFAULT_EPSILON};

    #[test]
    fn log_return_basic() {
        let result = LogReturn.compute(&make_records(&[50.0, 50.0, 55.0]));
        assert!(result[0].is_nan());
        assert_approx(result[1], 0.0, DEFAULT_EPSILON);
        assert_approx(result[2], (1.1f64).ln(), DEFAULT_EPSILON);
    }
}
