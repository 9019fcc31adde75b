//! FeatureEngine: run every enabled feature and the label over a series.

use super::{generate_labels, Feature, FeatureSet, Lookback};
use crate::data::schema::{require_column, SchemaError};
use crate::domain::{Column, FeatureRow, InstrumentSeries, RawRecord};

pub struct FeatureEngine {
    set: FeatureSet,
    features: Vec<Box<dyn Feature>>,
}

impl FeatureEngine {
    pub fn new(set: FeatureSet) -> Self {
        Self {
            set,
            features: set.features(),
        }
    }

    pub fn feature_set(&self) -> FeatureSet {
        self.set
    }

    /// Combined lookback of all enabled features. `Bounded(0)` for the basic
    /// set, which has no derived columns.
    pub fn lookback(&self) -> Lookback {
        self.features
            .iter()
            .fold(Lookback::Bounded(0), |acc, f| acc.max(f.lookback()))
    }

    pub fn derived_columns(&self) -> Vec<Column> {
        self.features.iter().map(|f| f.column()).collect()
    }

    /// Output columns given the raw columns the input carries.
    pub fn output_columns(&self, raw: &[Column]) -> Vec<Column> {
        let mut cols = raw.to_vec();
        cols.extend(self.derived_columns());
        cols
    }

    pub fn compute(&self, series: &InstrumentSeries) -> Result<Vec<FeatureRow>, SchemaError> {
        self.compute_window(&series.instrument_id, &series.columns, &series.records)
    }

    /// Compute rows for a contiguous slice of one instrument's records.
    ///
    /// Rows near the start of the slice are only correct if the slice carries
    /// at least `lookback()` records of history before them.
    pub fn compute_window(
        &self,
        instrument_id: &str,
        columns: &[Column],
        records: &[RawRecord],
    ) -> Result<Vec<FeatureRow>, SchemaError> {
        if !self.features.is_empty() || self.set.has_label() {
            require_column(columns, Column::Close)?;
        }

        let mut rows: Vec<FeatureRow> = records
            .iter()
            .map(|r| {
                let mut row = FeatureRow::new(instrument_id, r.timestamp);
                for &c in columns {
                    row.values.set(c, r.value(c));
                }
                row
            })
            .collect();

        for feature in &self.features {
            let values = feature.compute(records);
            for (row, v) in rows.iter_mut().zip(values) {
                row.values.set(feature.column(), v);
            }
        }

        // Label last, after every feature
        if self.set.has_label() {
            for (row, label) in rows.iter_mut().zip(generate_labels(records)) {
                row.label = label;
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::make_records;

    fn series(closes: &[f64]) -> InstrumentSeries {
        InstrumentSeries {
            instrument_id: "TEST".into(),
            columns: vec![Column::Close],
            records: make_records(closes),
        }
    }

    #[test]
    fn engineered_rows_carry_every_column_and_label() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let engine = FeatureEngine::new(FeatureSet::FeatureEngineered { rsi: true });
        let rows = engine.compute(&series(&closes)).unwrap();
        assert_eq!(rows.len(), 30);
        let r = &rows[25];
        for c in [
            Column::Close,
            Column::Sma20,
            Column::LagReturn1,
            Column::LogReturn,
            Column::Rsi14,
        ] {
            assert!(r.value(c).is_finite(), "{c} undefined");
        }
        assert_eq!(r.label, Some(1));
        assert_eq!(rows[29].label, None);
    }

    #[test]
    fn basic_set_copies_raw_only() {
        let engine = FeatureEngine::new(FeatureSet::Basic);
        let rows = engine.compute(&series(&[1.0, 2.0])).unwrap();
        assert_eq!(rows[0].values.columns(), vec![Column::Close]);
        assert!(rows.iter().all(|r| r.label.is_none()));
        assert_eq!(engine.lookback(), Lookback::Bounded(0));
    }

    #[test]
    fn missing_close_is_schema_error() {
        let mut s = series(&[1.0]);
        s.columns = vec![Column::Open];
        let engine = FeatureEngine::new(FeatureSet::default());
        assert_eq!(
            engine.compute(&s).unwrap_err(),
            SchemaError::MissingColumn("Close".into())
        );
    }

    #[test]
    fn lookback_depends_on_rsi() {
        let with = FeatureEngine::new(FeatureSet::FeatureEngineered { rsi: true });
        let without = FeatureEngine::new(FeatureSet::FeatureEngineered { rsi: false });
        assert_eq!(with.lookback(), Lookback::Unbounded);
        assert_eq!(without.lookback(), Lookback::Bounded(19));
    }
}
