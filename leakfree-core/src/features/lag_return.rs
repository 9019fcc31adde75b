//! Lag_Return_1: the prior day's percent change.
//!
//! Computed as the one-period percent change, then shifted forward one step,
//! so the value at t is `close[t-1] / close[t-2] - 1` and never touches
//! `close[t]`.

use super::{closes, series, Feature, Lookback};
use crate::domain::{Column, RawRecord};

#[derive(Debug, Clone, Default)]
pub struct LaggedReturn;

impl Feature for LaggedReturn {
    fn column(&self) -> Column {
        Column::LagReturn1
    }

    fn lookback(&self) -> Lookback {
        Lookback::Bounded(2)
    }

    fn compute(&self, records: &[RawRecord]) -> Vec<f64> {
        series::shift(&series::pct_change(&closes(records), 1), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, make_records, DEFAULT_EPSILON};

    #[test]
    fn value_at_t_ignores_same_day_close() {
        let mut records = make_records(&[100.0, 105.0, 110.0]);
        let before = LaggedReturn.compute(&records)[2];
        records[2] = records[2].clone().with(Column::Close, 1_000.0);
        let after = LaggedReturn.compute(&records)[2];
        assert_approx(before, 0.05, DEFAULT_EPSILON);
        assert_eq!(before, after);
    }

    #[test]
    fn first_two_rows_undefined() {
        let result = LaggedReturn.compute(&make_records(&[1.0, 2.0, 3.0]));
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 1.0, DEFAULT_EPSILON);
    }
}
