//! Entity partitioner: split a combined dataset into per-instrument series.
//!
//! Input order is not trusted. Each instrument's records are stably sorted by
//! timestamp and duplicate timestamps keep their first occurrence.

use super::schema::{check_instrument_id, require_instrument_column, SchemaError, REQUIRED_COLUMNS};
use crate::domain::{Column, InstrumentSeries, RawDataset, RawRecord};
use std::collections::BTreeMap;
use tracing::debug;

/// Output of [`partition`].
#[derive(Debug, Clone, Default)]
pub struct Partitioned {
    pub series: BTreeMap<String, InstrumentSeries>,
    /// Dropped duplicate (instrument, timestamp) rows, per instrument.
    pub duplicates: BTreeMap<String, usize>,
}

impl Partitioned {
    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|s| s.as_str())
    }

    pub fn get(&self, instrument_id: &str) -> Option<&InstrumentSeries> {
        self.series.get(instrument_id)
    }

    pub fn total_duplicates(&self) -> usize {
        self.duplicates.values().sum()
    }
}

/// Group records by instrument, sort each group, drop duplicate timestamps.
pub fn partition(dataset: &RawDataset) -> Result<Partitioned, SchemaError> {
    require_instrument_column(dataset)?;
    let header = dataset.raw_columns();

    let mut groups: BTreeMap<String, Vec<RawRecord>> = BTreeMap::new();
    for (row, record) in dataset.records.iter().enumerate() {
        check_instrument_id(&record.instrument_id, row)?;
        groups
            .entry(record.instrument_id.clone())
            .or_default()
            .push(record.clone());
    }

    let mut out = Partitioned::default();
    for (id, mut records) in groups {
        // sort_by_key is stable, so the first occurrence of a date stays first
        records.sort_by_key(|r| r.timestamp);
        let before = records.len();
        records.dedup_by_key(|r| r.timestamp);
        let dropped = before - records.len();
        if dropped > 0 {
            debug!(instrument = %id, dropped, "dropped duplicate timestamps");
            out.duplicates.insert(id.clone(), dropped);
        }
        let columns = instrument_columns(&header, &records);
        out.series.insert(
            id.clone(),
            InstrumentSeries {
                instrument_id: id,
                columns,
                records,
            },
        );
    }
    Ok(out)
}

/// Header columns this instrument actually carries. Required columns always
/// stay; an optional column (Adj Close) stays only if at least one of the
/// instrument's own records has a value for it.
fn instrument_columns(header: &[Column], records: &[RawRecord]) -> Vec<Column> {
    header
        .iter()
        .copied()
        .filter(|&c| {
            REQUIRED_COLUMNS.contains(&c.name())
                || records
                    .iter()
                    .any(|r| r.values.get(c).is_some_and(f64::is_finite))
        })
        .collect()
}
