//! Raw-data providers and batch loading.
//!
//! - [`CsvFileProvider`]: serves instruments out of one combined raw CSV.
//! - [`SyntheticProvider`]: deterministic random walks, seeded per instrument.
//!
//! [`load_universe`] fetches every ticker of a universe, skips the ones a
//! provider has no data for, and combines the rest into one raw dataset.

use crate::ingest::{read_raw_csv, IngestError};
use chrono::{Datelike, NaiveDate};
use leakfree_core::data::{check_range, DataError, DataSource, FetchResult, RawDataProvider, Universe};
use leakfree_core::domain::{Column, RawDataset, RawRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

// ─── CSV file ───────────────────────────────────────────────────────

/// Serves fetches from a raw CSV read once at construction.
pub struct CsvFileProvider {
    columns: Vec<Column>,
    by_instrument: BTreeMap<String, Vec<RawRecord>>,
}

impl CsvFileProvider {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        Ok(Self::from_dataset(read_raw_csv(path)?))
    }

    pub fn from_dataset(dataset: RawDataset) -> Self {
        let columns = dataset.raw_columns();
        let mut by_instrument: BTreeMap<String, Vec<RawRecord>> = BTreeMap::new();
        for record in dataset.records {
            by_instrument
                .entry(record.instrument_id.clone())
                .or_default()
                .push(record);
        }
        Self {
            columns,
            by_instrument,
        }
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.by_instrument.keys().map(String::as_str)
    }
}

impl RawDataProvider for CsvFileProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        check_range(start, end)?;
        let records: Vec<RawRecord> = self
            .by_instrument
            .get(instrument_id)
            .map(|rs| {
                rs.iter()
                    .filter(|r| r.timestamp >= start && r.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if records.is_empty() {
            return Err(DataError::NoData {
                instrument: instrument_id.to_string(),
            });
        }
        Ok(FetchResult {
            instrument_id: instrument_id.to_string(),
            records,
            columns: self.columns.clone(),
            source: DataSource::CsvFile,
        })
    }
}

// ─── Synthetic ──────────────────────────────────────────────────────

/// Random-walk generator for demos and tests.
///
/// The RNG is seeded from a BLAKE3 hash of the instrument id, so the same
/// instrument always yields the same series. Weekends are skipped.
#[derive(Debug, Clone, Default)]
pub struct SyntheticProvider {
    /// Instruments that report no data, for exercising the skip path.
    pub empty: Vec<String>,
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(instrument_id: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawRecord> {
        let seed: [u8; 32] = *blake3::hash(instrument_id.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let mut records = Vec::new();
        let mut price = rng.gen_range(20.0..200.0_f64);
        let mut current = start;
        while current <= end {
            let weekday = current.weekday();
            if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
                current += chrono::Duration::days(1);
                continue;
            }

            let daily_return: f64 = rng.gen_range(-0.03..0.03);
            let open = price;
            let close = price * (1.0 + daily_return);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000..5_000_000u64) as f64;

            records.push(
                RawRecord::new(instrument_id, current)
                    .with(Column::Open, open)
                    .with(Column::High, high)
                    .with(Column::Low, low)
                    .with(Column::Close, close)
                    .with(Column::AdjClose, close)
                    .with(Column::Volume, volume),
            );
            price = close;
            current += chrono::Duration::days(1);
        }
        records
    }
}

impl RawDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        check_range(start, end)?;
        let records = if self.empty.iter().any(|e| e == instrument_id) {
            Vec::new()
        } else {
            Self::generate(instrument_id, start, end)
        };
        if records.is_empty() {
            return Err(DataError::NoData {
                instrument: instrument_id.to_string(),
            });
        }
        Ok(FetchResult {
            instrument_id: instrument_id.to_string(),
            records,
            columns: Column::RAW.to_vec(),
            source: DataSource::Synthetic,
        })
    }
}

// ─── Batch loading ──────────────────────────────────────────────────

/// Raw dataset assembled from a universe, plus what was left out.
#[derive(Debug, Clone, Default)]
pub struct BatchLoad {
    pub dataset: RawDataset,
    /// Instruments the provider had no data for.
    pub skipped: Vec<String>,
    /// Instruments whose fetch failed for another reason.
    pub failed: Vec<(String, String)>,
}

/// Fetch every ticker of `universe`. `NoData` is a skip; other errors are
/// recorded and do not stop the batch.
pub fn load_universe(
    provider: &dyn RawDataProvider,
    universe: &Universe,
    start: NaiveDate,
    end: NaiveDate,
) -> BatchLoad {
    let mut out = BatchLoad::default();
    for ticker in universe.tickers() {
        match provider.fetch(ticker, start, end) {
            Ok(fetched) => {
                debug!(instrument = %ticker, rows = fetched.records.len(), source = provider.name(), "fetched");
                let has_adj = fetched.columns.contains(&Column::AdjClose);
                out.dataset
                    .extend(RawDataset::with_standard_header(fetched.records, has_adj));
            }
            Err(e) if e.is_no_data() => {
                warn!(instrument = %ticker, "skipped: no data");
                out.skipped.push(ticker.clone());
            }
            Err(e) => {
                warn!(instrument = %ticker, error = %e, "fetch failed");
                out.failed.push((ticker.clone(), e.to_string()));
            }
        }
    }
    info!(
        instruments = universe.len() - out.skipped.len() - out.failed.len(),
        skipped = out.skipped.len(),
        failed = out.failed.len(),
        rows = out.dataset.len(),
        "batch load finished"
    );
    out
}
