//! Raw input records and per-instrument series.

use super::column::{Column, ColumnValues, DATE_COLUMN, TICKER_COLUMN};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One input row: a single instrument on a single date.
///
/// Only raw columns are populated. Missing observations are `NAN`; a column
/// the source never carried (typically `Adj Close`) is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub instrument_id: String,
    pub timestamp: NaiveDate,
    pub values: ColumnValues,
}

impl RawRecord {
    pub fn new(instrument_id: impl Into<String>, timestamp: NaiveDate) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            timestamp,
            values: ColumnValues::new(),
        }
    }

    /// Builder-style setter used by providers and tests.
    pub fn with(mut self, column: Column, value: f64) -> Self {
        self.values.set(column, value);
        self
    }

    /// Value of `column`, or `NAN` if the column is absent.
    pub fn value(&self, column: Column) -> f64 {
        self.values.get(column).unwrap_or(f64::NAN)
    }

    pub fn close(&self) -> f64 {
        self.value(Column::Close)
    }
}

/// A combined multi-instrument table as read from the input source.
///
/// `columns` is the header of the source table, kept so that schema checks
/// can distinguish "column absent" from "column present but empty".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl RawDataset {
    /// Dataset with the full input header (`Date, Ticker, Open, ..., Volume`).
    pub fn with_standard_header(records: Vec<RawRecord>, adj_close: bool) -> Self {
        let mut columns = vec![DATE_COLUMN.to_string(), TICKER_COLUMN.to_string()];
        for c in Column::RAW {
            if c == Column::AdjClose && !adj_close {
                continue;
            }
            columns.push(c.name().to_string());
        }
        Self { columns, records }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Raw numeric columns declared in the header, in schema order.
    pub fn raw_columns(&self) -> Vec<Column> {
        Column::RAW
            .into_iter()
            .filter(|c| self.has_column(c.name()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append another dataset's records. Headers are unioned.
    pub fn extend(&mut self, other: RawDataset) {
        for c in other.columns {
            if !self.columns.contains(&c) {
                self.columns.push(c);
            }
        }
        self.records.extend(other.records);
    }
}

/// Records of one instrument, strictly increasing by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSeries {
    pub instrument_id: String,
    pub columns: Vec<Column>,
    pub records: Vec<RawRecord>,
}

impl InstrumentSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.timestamp)
    }

    /// Index of the first record dated strictly after `ts`.
    pub fn position_after(&self, ts: NaiveDate) -> usize {
        self.records.partition_point(|r| r.timestamp <= ts)
    }
}
