//! Raw-data provider trait and structured error types.
//!
//! The RawDataProvider trait abstracts over data sources (CSV file, synthetic
//! generator) so the pipeline can swap implementations and mock for tests.

use crate::domain::{Column, RawRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// The source has no rows for this instrument and range. Callers skip
    /// the instrument; it is not a pipeline failure.
    #[error("no data for instrument '{instrument}'")]
    NoData { instrument: String },

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid date range: {start} > {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

impl DataError {
    pub fn is_no_data(&self) -> bool {
        matches!(self, DataError::NoData { .. })
    }
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    CsvFile,
    Synthetic,
}

/// Result of a successful fetch for one instrument.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub instrument_id: String,
    pub records: Vec<RawRecord>,
    /// Raw columns the source carries.
    pub columns: Vec<Column>,
    pub source: DataSource,
}

/// Supplies raw records for an instrument and date range (inclusive).
///
/// Returning `DataError::NoData` for an empty result is part of the contract.
pub trait RawDataProvider: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError>;
}

/// Reject inverted ranges before touching a source.
pub fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), DataError> {
    if start > end {
        Err(DataError::InvalidRange { start, end })
    } else {
        Ok(())
    }
}
