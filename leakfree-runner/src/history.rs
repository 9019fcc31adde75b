//! Run history: JSONL append-only persistence.
//!
//! One JSON object per pipeline run: when it ran, what it ran on (a BLAKE3
//! hash of the raw dataset plus the configuration hash), the options used,
//! and what happened to each instrument.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use leakfree_core::domain::{Column, RawDataset};
use leakfree_core::merge::ProcessOptions;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::report::PipelineReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: NaiveDateTime,
    pub dataset_hash: String,
    pub config_hash: String,
    pub options: ProcessOptions,
    pub report: PipelineReport,
}

/// Deterministic BLAKE3 hash over a raw dataset.
///
/// Records are hashed in (instrument, date) order so the hash does not
/// depend on input row order.
pub fn dataset_hash(dataset: &RawDataset) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in &dataset.columns {
        hasher.update(c.as_bytes());
    }

    let mut records: Vec<_> = dataset.records.iter().collect();
    records.sort_by(|a, b| {
        a.instrument_id
            .cmp(&b.instrument_id)
            .then(a.timestamp.cmp(&b.timestamp))
    });
    for r in records {
        hasher.update(r.instrument_id.as_bytes());
        hasher.update(r.timestamp.to_string().as_bytes());
        for c in Column::RAW {
            hasher.update(&r.value(c).to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// JSONL history file manager.
///
/// Each line is an independent JSON object, so a partial write damages at
/// most the last line.
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, entry: &HistoryEntry) -> io::Result<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{json}")?;
        file.flush()
    }

    /// Read all entries. Malformed lines are skipped with a warning.
    pub fn read_all(&self) -> io::Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = io::BufReader::new(file);
        let mut entries = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = i + 1, error = %e, "skipping malformed history line"),
            }
        }

        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
