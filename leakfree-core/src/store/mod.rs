//! Processed dataset and its persistence.
//!
//! The processed dataset is append-only: rows for an instrument are sorted by
//! timestamp, keyed by (instrument, timestamp), and never rewritten except by
//! an explicit `replace`.

pub mod lock;
pub mod memory;
pub mod parquet;

pub use lock::InstrumentLocks;
pub use memory::MemoryStore;
pub use parquet::{ParquetStore, StoreMeta};

use crate::domain::{Column, FeatureRow};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt partition for '{instrument}': {reason}")]
    Corrupt { instrument: String, reason: String },

    #[error("out-of-order append for '{instrument}': {first} is not after {last}")]
    OutOfOrder {
        instrument: String,
        last: NaiveDate,
        first: NaiveDate,
    },

    #[error("row for '{found}' appended under '{expected}'")]
    WrongInstrument { expected: String, found: String },
}

/// Check that `rows` can be appended after `last`: single instrument,
/// strictly increasing, all later than `last`.
pub fn check_append(
    instrument_id: &str,
    last: Option<NaiveDate>,
    rows: &[FeatureRow],
) -> Result<(), StoreError> {
    let mut prev = last;
    for row in rows {
        if row.instrument_id != instrument_id {
            return Err(StoreError::WrongInstrument {
                expected: instrument_id.to_string(),
                found: row.instrument_id.clone(),
            });
        }
        if let Some(p) = prev {
            if row.timestamp <= p {
                return Err(StoreError::OutOfOrder {
                    instrument: instrument_id.to_string(),
                    last: p,
                    first: row.timestamp,
                });
            }
        }
        prev = Some(row.timestamp);
    }
    Ok(())
}

/// Persistence for processed rows, one independent partition per instrument.
///
/// Implementations need not serialize writers themselves; callers hold the
/// instrument's lock from [`InstrumentLocks`] around read-modify-write cycles.
pub trait ProcessedStore: Send + Sync {
    /// Instruments with persisted rows, sorted.
    fn instruments(&self) -> Result<Vec<String>, StoreError>;

    /// All persisted rows for one instrument, in timestamp order. Empty if
    /// nothing is persisted.
    fn load(&self, instrument_id: &str) -> Result<Vec<FeatureRow>, StoreError>;

    /// Append rows after the last persisted timestamp.
    fn append(&self, instrument_id: &str, rows: &[FeatureRow]) -> Result<(), StoreError>;

    /// Replace every persisted row of the instrument.
    fn replace(&self, instrument_id: &str, rows: &[FeatureRow]) -> Result<(), StoreError>;

    fn last_timestamp(&self, instrument_id: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.load(instrument_id)?.last().map(|r| r.timestamp))
    }

    fn row_count(&self, instrument_id: &str) -> Result<usize, StoreError> {
        Ok(self.load(instrument_id)?.len())
    }

    /// Persisted timestamps of one instrument.
    fn keys(&self, instrument_id: &str) -> Result<BTreeSet<NaiveDate>, StoreError> {
        Ok(self
            .load(instrument_id)?
            .into_iter()
            .map(|r| r.timestamp)
            .collect())
    }

    fn load_all(&self) -> Result<ProcessedDataset, StoreError> {
        let mut dataset = ProcessedDataset::new();
        for id in self.instruments()? {
            let rows = self.load(&id)?;
            dataset.append(&id, rows)?;
        }
        Ok(dataset)
    }
}

/// In-memory processed dataset, keyed by instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedDataset {
    instruments: BTreeMap<String, Vec<FeatureRow>>,
}

impl ProcessedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows in any order. Rows are grouped and sorted; duplicate
    /// keys are rejected.
    pub fn from_rows(rows: Vec<FeatureRow>) -> Result<Self, StoreError> {
        let mut grouped: BTreeMap<String, Vec<FeatureRow>> = BTreeMap::new();
        for row in rows {
            grouped.entry(row.instrument_id.clone()).or_default().push(row);
        }
        let mut dataset = Self::new();
        for (id, mut rows) in grouped {
            rows.sort_by_key(|r| r.timestamp);
            dataset.append(&id, rows)?;
        }
        Ok(dataset)
    }

    /// Append rows for one instrument, enforcing strict timestamp order.
    pub fn append(&mut self, instrument_id: &str, rows: Vec<FeatureRow>) -> Result<(), StoreError> {
        let existing = self.instruments.entry(instrument_id.to_string()).or_default();
        check_append(instrument_id, existing.last().map(|r| r.timestamp), &rows)?;
        existing.extend(rows);
        Ok(())
    }

    pub fn get(&self, instrument_id: &str) -> Option<&[FeatureRow]> {
        self.instruments.get(instrument_id).map(|v| v.as_slice())
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.instruments.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FeatureRow])> {
        self.instruments
            .iter()
            .map(|(id, rows)| (id.as_str(), rows.as_slice()))
    }

    /// Total row count across instruments.
    pub fn len(&self) -> usize {
        self.instruments.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rows ordered by (timestamp, instrument).
    pub fn interleaved(&self) -> Vec<&FeatureRow> {
        let mut rows: Vec<&FeatureRow> = self.instruments.values().flatten().collect();
        rows.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.instrument_id.cmp(&b.instrument_id))
        });
        rows
    }

    /// Distinct timestamps across all instruments, ascending.
    pub fn timestamps(&self) -> Vec<NaiveDate> {
        let set: BTreeSet<NaiveDate> = self
            .instruments
            .values()
            .flatten()
            .map(|r| r.timestamp)
            .collect();
        set.into_iter().collect()
    }

    /// Union of value columns present in any row, in schema order.
    pub fn columns(&self) -> Vec<Column> {
        Column::ALL
            .into_iter()
            .filter(|&c| {
                self.instruments
                    .values()
                    .flatten()
                    .any(|r| r.values.contains(c))
            })
            .collect()
    }

    /// True if any row carries a label.
    pub fn has_label(&self) -> bool {
        self.instruments
            .values()
            .flatten()
            .any(|r| r.label.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, day: u32) -> FeatureRow {
        let mut r = FeatureRow::new(id, NaiveDate::from_ymd_opt(2024, 2, day).unwrap());
        r.values.set(Column::Close, day as f64);
        r
    }

    #[test]
    fn append_requires_strictly_increasing() {
        let mut ds = ProcessedDataset::new();
        ds.append("A", vec![row("A", 1), row("A", 2)]).unwrap();
        let err = ds.append("A", vec![row("A", 2)]).unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
        ds.append("A", vec![row("A", 3)]).unwrap();
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn append_rejects_foreign_rows() {
        let mut ds = ProcessedDataset::new();
        let err = ds.append("A", vec![row("B", 1)]).unwrap_err();
        assert!(matches!(err, StoreError::WrongInstrument { .. }));
    }

    #[test]
    fn from_rows_groups_and_sorts() {
        let ds = ProcessedDataset::from_rows(vec![row("B", 2), row("A", 3), row("B", 1)]).unwrap();
        assert_eq!(ds.instruments().collect::<Vec<_>>(), vec!["A", "B"]);
        let b = ds.get("B").unwrap();
        assert!(b[0].timestamp < b[1].timestamp);
    }

    #[test]
    fn from_rows_rejects_duplicate_keys() {
        assert!(ProcessedDataset::from_rows(vec![row("A", 1), row("A", 1)]).is_err());
    }

    #[test]
    fn interleaved_orders_by_time_then_instrument() {
        let ds = ProcessedDataset::from_rows(vec![row("B", 1), row("A", 2), row("A", 1)]).unwrap();
        let keys: Vec<(&str, u32)> = ds
            .interleaved()
            .iter()
            .map(|r| (r.instrument_id.as_str(), chrono::Datelike::day(&r.timestamp)))
            .collect();
        assert_eq!(keys, vec![("A", 1), ("B", 1), ("A", 2)]);
        assert_eq!(ds.timestamps().len(), 2);
    }
}
