//! Column catalog: external schema names and causality classes.
//!
//! Every numeric column the engine can produce is named here. The label is
//! not a `Column`: it lives in its own field on `FeatureRow` so it can never
//! be swept into a feature matrix or a scaler by accident.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the date index column in the external schema.
pub const DATE_COLUMN: &str = "Date";

/// Name of the instrument identifier column in the external schema.
pub const TICKER_COLUMN: &str = "Ticker";

/// Name of the binary target column.
pub const LABEL_COLUMN: &str = "y";

/// A numeric column of a raw or processed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Column {
    #[serde(rename = "Open")]
    Open,
    #[serde(rename = "High")]
    High,
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Close")]
    Close,
    #[serde(rename = "Adj Close")]
    AdjClose,
    #[serde(rename = "Volume")]
    Volume,
    #[serde(rename = "SMA_20")]
    Sma20,
    #[serde(rename = "Lag_Return_1")]
    LagReturn1,
    #[serde(rename = "Log_Return")]
    LogReturn,
    #[serde(rename = "RSI_14")]
    Rsi14,
}

/// How a column's value at time *t* relates to the price timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Causality {
    /// Observed directly from the record at *t*.
    Raw,
    /// Uses realized prices up to and including *t*.
    Realized,
    /// Uses prices up to *t − k* only.
    Shifted(usize),
    /// Uses prices after *t*. Only the label is allowed to be forward.
    Forward(usize),
}

impl Column {
    pub const COUNT: usize = 10;

    /// All columns in external schema order.
    pub const ALL: [Column; Column::COUNT] = [
        Column::Open,
        Column::High,
        Column::Low,
        Column::Close,
        Column::AdjClose,
        Column::Volume,
        Column::Sma20,
        Column::LagReturn1,
        Column::LogReturn,
        Column::Rsi14,
    ];

    /// Columns read from the input table.
    pub const RAW: [Column; 6] = [
        Column::Open,
        Column::High,
        Column::Low,
        Column::Close,
        Column::AdjClose,
        Column::Volume,
    ];

    /// Dense index used by `ColumnValues`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// External schema name (`"SMA_20"`, `"Adj Close"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Column::Open => "Open",
            Column::High => "High",
            Column::Low => "Low",
            Column::Close => "Close",
            Column::AdjClose => "Adj Close",
            Column::Volume => "Volume",
            Column::Sma20 => "SMA_20",
            Column::LagReturn1 => "Lag_Return_1",
            Column::LogReturn => "Log_Return",
            Column::Rsi14 => "RSI_14",
        }
    }

    /// Inverse of [`Column::name`].
    pub fn from_name(name: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn causality(self) -> Causality {
        match self {
            Column::Open
            | Column::High
            | Column::Low
            | Column::Close
            | Column::AdjClose
            | Column::Volume => Causality::Raw,
            // Log_Return describes day t's own realized move. It is a
            // volatility feature, not a shifted predictor.
            Column::Sma20 | Column::LogReturn | Column::Rsi14 => Causality::Realized,
            Column::LagReturn1 => Causality::Shifted(1),
        }
    }

    pub fn is_raw(self) -> bool {
        self.causality() == Causality::Raw
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dense per-column storage for one row.
///
/// `None` means the column is absent from the dataset; `Some(NAN)` means the
/// column exists but the value is missing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnValues([Option<f64>; Column::COUNT]);

impl ColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: Column) -> Option<f64> {
        self.0[column.index()]
    }

    pub fn set(&mut self, column: Column, value: f64) {
        self.0[column.index()] = Some(value);
    }

    pub fn remove(&mut self, column: Column) {
        self.0[column.index()] = None;
    }

    pub fn contains(&self, column: Column) -> bool {
        self.0[column.index()].is_some()
    }

    /// Present columns with their values, in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (Column, f64)> + '_ {
        Column::ALL
            .into_iter()
            .filter_map(move |c| self.get(c).map(|v| (c, v)))
    }

    /// Present columns, in schema order.
    pub fn columns(&self) -> Vec<Column> {
        self.iter().map(|(c, _)| c).collect()
    }

    /// True if any present column holds a NaN or infinite value.
    pub fn has_undefined(&self) -> bool {
        self.iter().any(|(_, v)| !v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for c in Column::ALL {
            assert_eq!(Column::from_name(c.name()), Some(c));
        }
        assert_eq!(Column::from_name("Ticker"), None);
    }

    #[test]
    fn index_matches_schema_order() {
        for (i, c) in Column::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }

    #[test]
    fn only_lag_return_is_shifted() {
        let shifted: Vec<Column> = Column::ALL
            .into_iter()
            .filter(|c| matches!(c.causality(), Causality::Shifted(_)))
            .collect();
        assert_eq!(shifted, vec![Column::LagReturn1]);
        assert_eq!(Column::LogReturn.causality(), Causality::Realized);
    }

    #[test]
    fn serde_uses_schema_names() {
        let json = serde_json::to_string(&Column::AdjClose).unwrap();
        assert_eq!(json, "\"Adj Close\"");
        let back: Column = serde_json::from_str("\"SMA_20\"").unwrap();
        assert_eq!(back, Column::Sma20);
    }

    #[test]
    fn values_track_presence_and_missing() {
        let mut v = ColumnValues::new();
        assert!(!v.contains(Column::Close));
        v.set(Column::Close, 10.0);
        v.set(Column::Open, f64::NAN);
        assert_eq!(v.columns(), vec![Column::Open, Column::Close]);
        assert!(v.has_undefined());
        v.set(Column::Open, 9.5);
        assert!(!v.has_undefined());
        v.remove(Column::Open);
        assert_eq!(v.columns(), vec![Column::Close]);
    }
}
