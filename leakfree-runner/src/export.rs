//! CSV export of raw, processed and split data.
//!
//! Processed files follow the processed schema: `Date, Ticker`, the numeric
//! columns in schema order, then `y` when the dataset carries labels. Rows are
//! ordered by date, then ticker.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use leakfree_core::domain::{Column, FeatureRow, RawDataset, DATE_COLUMN, LABEL_COLUMN, TICKER_COLUMN};
use leakfree_core::split::SplitFold;
use leakfree_core::store::ProcessedDataset;

pub const TRAIN_FILE: &str = "train_data.csv";
pub const TEST_FILE: &str = "test_data.csv";

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

// ─── Raw ────────────────────────────────────────────────────────────

/// Raw dataset in the input schema, readable back by the ingester.
pub fn export_raw_csv(dataset: &RawDataset) -> Result<String> {
    let columns = dataset.raw_columns();
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec![DATE_COLUMN, TICKER_COLUMN];
    header.extend(columns.iter().map(|c| c.name()));
    wtr.write_record(&header)?;

    for r in &dataset.records {
        let mut record = vec![r.timestamp.to_string(), r.instrument_id.clone()];
        record.extend(columns.iter().map(|&c| format_value(r.value(c))));
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Processed ──────────────────────────────────────────────────────

/// Rows in the processed schema.
pub fn export_rows_csv<'a>(
    rows: impl IntoIterator<Item = &'a FeatureRow>,
    columns: &[Column],
    with_label: bool,
) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec![DATE_COLUMN, TICKER_COLUMN];
    header.extend(columns.iter().map(|c| c.name()));
    if with_label {
        header.push(LABEL_COLUMN);
    }
    wtr.write_record(&header)?;

    for r in rows {
        let mut record = vec![r.timestamp.to_string(), r.instrument_id.clone()];
        record.extend(columns.iter().map(|&c| format_value(r.value(c))));
        if with_label {
            record.push(r.label.map(|y| y.to_string()).unwrap_or_default());
        }
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_processed_csv(dataset: &ProcessedDataset) -> Result<String> {
    export_rows_csv(
        dataset.interleaved(),
        &dataset.columns(),
        dataset.has_label(),
    )
}

// ─── Files ──────────────────────────────────────────────────────────

pub fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Write `train_data.csv` and `test_data.csv` for one split under `dir`.
pub fn write_split(fold: &SplitFold, columns: &[Column], dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let with_label = fold
        .train_rows
        .iter()
        .chain(&fold.test_rows)
        .any(|r| r.label.is_some());
    let train_path = dir.join(TRAIN_FILE);
    let test_path = dir.join(TEST_FILE);
    write_file(&train_path, &export_rows_csv(&fold.train_rows, columns, with_label)?)?;
    write_file(&test_path, &export_rows_csv(&fold.test_rows, columns, with_label)?)?;
    Ok((train_path, test_path))
}
