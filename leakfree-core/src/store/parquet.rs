//! Parquet-backed processed store with Hive-style partitioning.
//!
//! Layout: `{dir}/instrument={ID}/part-{seq:06}.parquet` plus a `meta.json`
//! sidecar per instrument.
//!
//! - Each append writes a new part file; existing parts are never opened for
//!   writing, so previously persisted rows stay byte-identical.
//! - Writes are atomic (write to .tmp, rename into place). A replace stages
//!   the new part before any old part is removed.
//! - Loading concatenates parts in sequence order and verifies ordering.

use super::{check_append, ProcessedStore, StoreError};
use crate::domain::{Column, FeatureRow, DATE_COLUMN, LABEL_COLUMN, TICKER_COLUMN};
use chrono::NaiveDate;
use polars::prelude as pl;
use polars::prelude::SerReader;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const PARTITION_PREFIX: &str = "instrument=";
const REPLACE_STAGING: &str = "replace.parquet.tmp";

/// Metadata sidecar for one instrument's partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub instrument_id: String,
    pub columns: Vec<Column>,
    pub has_label: bool,
    pub row_count: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub parts: usize,
    pub updated_at: chrono::NaiveDateTime,
}

pub struct ParquetStore {
    dir: PathBuf,
}

impl ParquetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/instrument={ID}/`
    fn instrument_dir(&self, instrument_id: &str) -> PathBuf {
        self.dir.join(format!("{PARTITION_PREFIX}{instrument_id}"))
    }

    fn part_path(&self, instrument_id: &str, seq: usize) -> PathBuf {
        self.instrument_dir(instrument_id)
            .join(format!("part-{seq:06}.parquet"))
    }

    fn meta_path(&self, instrument_id: &str) -> PathBuf {
        self.instrument_dir(instrument_id).join("meta.json")
    }

    pub fn meta(&self, instrument_id: &str) -> Result<Option<StoreMeta>, StoreError> {
        let path = self.meta_path(instrument_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| StoreError::Io(format!("meta read: {e}")))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                instrument: instrument_id.to_string(),
                reason: format!("meta.json: {e}"),
            })
    }

    fn write_meta(&self, meta: &StoreMeta) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| StoreError::Serialization(format!("meta serialization: {e}")))?;
        let path = self.meta_path(&meta.instrument_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::Io(format!("meta write: {e}")))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(format!("meta rename: {e}"))
        })
    }

    /// Part files of an instrument, in sequence order.
    fn part_files(&self, instrument_id: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.instrument_dir(instrument_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut parts = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::Io(format!("read dir: {e}")))?;
        for entry in entries {
            let path = entry
                .map_err(|e| StoreError::Io(format!("dir entry: {e}")))?
                .path();
            if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
                parts.push(path);
            }
        }
        // zero-padded sequence numbers sort lexically
        parts.sort();
        Ok(parts)
    }

    fn write_part(
        &self,
        instrument_id: &str,
        seq: usize,
        meta_columns: &[Column],
        has_label: bool,
        rows: &[FeatureRow],
    ) -> Result<(), StoreError> {
        let path = self.part_path(instrument_id, seq);
        let tmp = path.with_extension("parquet.tmp");
        if let Err(e) = write_frame(&tmp, instrument_id, meta_columns, has_label, rows) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(format!("atomic rename failed: {e}"))
        })
    }

    fn new_meta(instrument_id: &str, rows: &[FeatureRow]) -> Option<StoreMeta> {
        let first = rows.first()?;
        let last = rows.last()?;
        Some(StoreMeta {
            instrument_id: instrument_id.to_string(),
            columns: first.values.columns(),
            has_label: rows.iter().any(|r| r.label.is_some()),
            row_count: rows.len(),
            first_date: first.timestamp,
            last_date: last.timestamp,
            parts: 1,
            updated_at: chrono::Local::now().naive_local(),
        })
    }
}

impl ProcessedStore for ParquetStore {
    fn instruments(&self) -> Result<Vec<String>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::Io(format!("read dir: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(format!("dir entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_prefix(PARTITION_PREFIX) {
                if self.meta_path(id).exists() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn load(&self, instrument_id: &str) -> Result<Vec<FeatureRow>, StoreError> {
        let Some(meta) = self.meta(instrument_id)? else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<FeatureRow> = Vec::with_capacity(meta.row_count);
        for part in self.part_files(instrument_id)? {
            let loaded = load_part(&part, instrument_id, &meta)?;
            check_append(instrument_id, rows.last().map(|r| r.timestamp), &loaded).map_err(|e| {
                StoreError::Corrupt {
                    instrument: instrument_id.to_string(),
                    reason: format!("{}: {e}", part.display()),
                }
            })?;
            rows.extend(loaded);
        }
        if rows.len() != meta.row_count {
            return Err(StoreError::Corrupt {
                instrument: instrument_id.to_string(),
                reason: format!("meta says {} rows, parts hold {}", meta.row_count, rows.len()),
            });
        }
        Ok(rows)
    }

    fn last_timestamp(&self, instrument_id: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.meta(instrument_id)?.map(|m| m.last_date))
    }

    fn row_count(&self, instrument_id: &str) -> Result<usize, StoreError> {
        Ok(self.meta(instrument_id)?.map_or(0, |m| m.row_count))
    }

    fn append(&self, instrument_id: &str, rows: &[FeatureRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let existing = self.meta(instrument_id)?;
        check_append(instrument_id, existing.as_ref().map(|m| m.last_date), rows)?;

        fs::create_dir_all(self.instrument_dir(instrument_id))
            .map_err(|e| StoreError::Io(format!("failed to create dir: {e}")))?;

        let meta = match existing {
            None => Self::new_meta(instrument_id, rows),
            Some(mut meta) => {
                let columns = rows[0].values.columns();
                if columns != meta.columns {
                    return Err(StoreError::Corrupt {
                        instrument: instrument_id.to_string(),
                        reason: format!(
                            "column set changed: persisted {:?}, appending {:?}",
                            meta.columns, columns
                        ),
                    });
                }
                meta.row_count += rows.len();
                meta.last_date = rows[rows.len() - 1].timestamp;
                meta.parts += 1;
                meta.updated_at = chrono::Local::now().naive_local();
                Some(meta)
            }
        };
        let Some(meta) = meta else {
            return Ok(());
        };

        let seq = self.part_files(instrument_id)?.len();
        self.write_part(instrument_id, seq, &meta.columns, meta.has_label, rows)?;
        self.write_meta(&meta)?;
        debug!(instrument = %instrument_id, rows = rows.len(), part = seq, "appended part");
        Ok(())
    }

    fn replace(&self, instrument_id: &str, rows: &[FeatureRow]) -> Result<(), StoreError> {
        check_append(instrument_id, None, rows)?;
        let dir = self.instrument_dir(instrument_id);

        // Stage the new part first; the old partition is untouched if this fails.
        let staged = match Self::new_meta(instrument_id, rows) {
            Some(meta) => {
                fs::create_dir_all(&dir)
                    .map_err(|e| StoreError::Io(format!("failed to create dir: {e}")))?;
                let staging = dir.join(REPLACE_STAGING);
                if let Err(e) =
                    write_frame(&staging, instrument_id, &meta.columns, meta.has_label, rows)
                {
                    let _ = fs::remove_file(&staging);
                    return Err(e);
                }
                Some((meta, staging))
            }
            None => None,
        };

        let old_parts = self.part_files(instrument_id)?;
        let meta_path = self.meta_path(instrument_id);
        if meta_path.exists() {
            fs::remove_file(&meta_path).map_err(|e| StoreError::Io(format!("remove meta: {e}")))?;
        }
        for part in &old_parts {
            fs::remove_file(part).map_err(|e| StoreError::Io(format!("remove part: {e}")))?;
        }

        if let Some((meta, staging)) = staged {
            fs::rename(&staging, self.part_path(instrument_id, 0))
                .map_err(|e| StoreError::Io(format!("promote staged part: {e}")))?;
            self.write_meta(&meta)?;
        }
        debug!(instrument = %instrument_id, removed = old_parts.len(), rows = rows.len(), "replaced partition");
        Ok(())
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Day zero of the stored date encoding (`NaiveDate::default()` is 1970-01-01).
fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn rows_to_dataframe(
    instrument_id: &str,
    columns: &[Column],
    has_label: bool,
    rows: &[FeatureRow],
) -> Result<pl::DataFrame, StoreError> {
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.timestamp - epoch()).num_days() as i32)
        .collect();
    let tickers: Vec<&str> = vec![instrument_id; rows.len()];

    let mut cols = vec![
        pl::Column::new(DATE_COLUMN.into(), dates)
            .cast(&pl::DataType::Date)
            .map_err(|e| StoreError::Parquet(format!("date cast: {e}")))?,
        pl::Column::new(TICKER_COLUMN.into(), tickers),
    ];
    for &c in columns {
        let values: Vec<f64> = rows.iter().map(|r| r.value(c)).collect();
        cols.push(pl::Column::new(c.name().into(), values));
    }
    if has_label {
        let labels: Vec<Option<i32>> = rows.iter().map(|r| r.label.map(i32::from)).collect();
        cols.push(pl::Column::new(LABEL_COLUMN.into(), labels));
    }

    pl::DataFrame::new(cols).map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_frame(
    path: &Path,
    instrument_id: &str,
    columns: &[Column],
    has_label: bool,
    rows: &[FeatureRow],
) -> Result<(), StoreError> {
    let mut df = rows_to_dataframe(instrument_id, columns, has_label, rows)?;
    let file = fs::File::create(path).map_err(|e| StoreError::Io(format!("create part: {e}")))?;
    pl::ParquetWriter::new(file)
        .finish(&mut df)
        .map(|_| ())
        .map_err(|e| StoreError::Parquet(format!("write part: {e}")))
}

fn load_part(path: &Path, instrument_id: &str, meta: &StoreMeta) -> Result<Vec<FeatureRow>, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        instrument: instrument_id.to_string(),
        reason: format!("{}: {reason}", path.display()),
    };

    let file = fs::File::open(path).map_err(|e| StoreError::Io(format!("open part: {e}")))?;
    let df = pl::ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read part: {e}")))?;

    let dates = df
        .column(DATE_COLUMN)
        .and_then(|c| c.date())
        .map_err(|e| corrupt(format!("date column: {e}")))?;

    let mut value_columns = Vec::with_capacity(meta.columns.len());
    for &c in &meta.columns {
        let ca = df
            .column(c.name())
            .and_then(|col| col.f64())
            .map_err(|e| corrupt(format!("column {c}: {e}")))?;
        value_columns.push((c, ca));
    }

    let labels = if meta.has_label {
        Some(
            df.column(LABEL_COLUMN)
                .and_then(|c| c.i32())
                .map_err(|e| corrupt(format!("label column: {e}")))?,
        )
    } else {
        None
    };

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let days = dates
            .get(i)
            .ok_or_else(|| corrupt(format!("null date at row {i}")))?;
        let mut row = FeatureRow::new(instrument_id, epoch() + chrono::Duration::days(days as i64));
        for (c, ca) in &value_columns {
            row.values.set(*c, ca.get(i).unwrap_or(f64::NAN));
        }
        if let Some(labels) = labels {
            row.label = match labels.get(i) {
                None => None,
                Some(v) => Some(
                    u8::try_from(v).map_err(|_| corrupt(format!("label {v} at row {i}")))?,
                ),
            };
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: u32, close: f64, label: Option<u8>) -> FeatureRow {
        let mut r = FeatureRow::new("SPY", NaiveDate::from_ymd_opt(2024, 1, day).unwrap());
        r.values.set(Column::Close, close);
        r.values.set(Column::Sma20, close / 2.0);
        r.label = label;
        r
    }

    #[test]
    fn append_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());

        store.append("SPY", &[row(2, 0.5, Some(1)), row(3, 0.25, Some(0))]).unwrap();
        let loaded = store.load("SPY").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].timestamp, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(loaded[1].value(Column::Close), 0.25);
        assert_eq!(loaded[1].value(Column::Sma20), 0.125);
        assert_eq!(loaded[0].label, Some(1));
        assert_eq!(store.instruments().unwrap(), vec!["SPY".to_string()]);
    }

    #[test]
    fn appends_add_parts_without_touching_old_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());

        store.append("SPY", &[row(2, 0.5, Some(1))]).unwrap();
        let first_part = store.part_path("SPY", 0);
        let before = fs::read(&first_part).unwrap();

        store.append("SPY", &[row(3, 0.7, Some(0)), row(4, 0.9, Some(1))]).unwrap();
        assert_eq!(fs::read(&first_part).unwrap(), before);

        let meta = store.meta("SPY").unwrap().unwrap();
        assert_eq!(meta.parts, 2);
        assert_eq!(meta.row_count, 3);
        assert_eq!(store.last_timestamp("SPY").unwrap(), NaiveDate::from_ymd_opt(2024, 1, 4));
        assert_eq!(store.load("SPY").unwrap().len(), 3);
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.append("SPY", &[row(5, 0.5, Some(1))]).unwrap();
        let err = store.append("SPY", &[row(4, 0.5, Some(1))]).unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
        assert_eq!(store.row_count("SPY").unwrap(), 1);
    }

    #[test]
    fn replace_drops_previous_parts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.append("SPY", &[row(2, 0.5, Some(1))]).unwrap();
        store.append("SPY", &[row(3, 0.5, Some(1))]).unwrap();
        store.replace("SPY", &[row(1, 0.1, Some(0))]).unwrap();

        let loaded = store.load("SPY").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].value(Column::Close), 0.1);
        assert_eq!(store.meta("SPY").unwrap().unwrap().parts, 1);
    }

    #[test]
    fn failed_replace_leaves_previous_data_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.append("SPY", &[row(2, 0.5, Some(1)), row(3, 0.6, Some(0))]).unwrap();

        // a directory squatting on the staging path makes the new part unwritable
        fs::create_dir(store.instrument_dir("SPY").join(REPLACE_STAGING)).unwrap();
        let err = store.replace("SPY", &[row(1, 0.1, Some(0))]).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        let loaded = store.load("SPY").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].value(Column::Close), 0.6);
        assert_eq!(store.meta("SPY").unwrap().unwrap().parts, 1);
    }

    #[test]
    fn replace_with_no_rows_clears_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.append("SPY", &[row(2, 0.5, Some(1))]).unwrap();
        store.replace("SPY", &[]).unwrap();
        assert!(store.load("SPY").unwrap().is_empty());
        assert!(store.instruments().unwrap().is_empty());
    }

    #[test]
    fn unknown_instrument_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        assert!(store.load("NOPE").unwrap().is_empty());
        assert!(store.instruments().unwrap().is_empty());
        assert_eq!(store.last_timestamp("NOPE").unwrap(), None);
    }

    #[test]
    fn rows_without_label_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.append("SPY", &[row(2, 0.5, None)]).unwrap();
        assert!(!store.meta("SPY").unwrap().unwrap().has_label);
        assert_eq!(store.load("SPY").unwrap()[0].label, None);
    }
}
