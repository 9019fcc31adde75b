//! FeatureRow: one processed output row.

use super::column::{Column, ColumnValues};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw and derived columns for one (instrument, timestamp), plus the label.
///
/// The label is kept apart from `values` so that normalization and feature
/// matrices never see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub instrument_id: String,
    pub timestamp: NaiveDate,
    pub values: ColumnValues,
    pub label: Option<u8>,
}

impl FeatureRow {
    pub fn new(instrument_id: impl Into<String>, timestamp: NaiveDate) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            timestamp,
            values: ColumnValues::new(),
            label: None,
        }
    }

    pub fn value(&self, column: Column) -> f64 {
        self.values.get(column).unwrap_or(f64::NAN)
    }

    /// Storage key.
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.instrument_id, self.timestamp)
    }

    /// Feature vector in schema order over `columns`. Absent columns are NAN.
    pub fn features(&self, columns: &[Column]) -> Vec<f64> {
        columns.iter().map(|&c| self.value(c)).collect()
    }
}
