//! Raw CSV ingestion.
//!
//! Reads the combined multi-instrument table
//! (`Date, Ticker, Open, High, Low, Close, [Adj Close], Volume`) into a
//! [`RawDataset`]. Empty cells and `NaN` become missing values; anything
//! else that does not parse as a number is a schema error.

use chrono::NaiveDate;
use leakfree_core::data::{validate_header, SchemaError};
use leakfree_core::domain::{Column, RawDataset, RawRecord, DATE_COLUMN, TICKER_COLUMN};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("CSV error: {0}")]
    Csv(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Read a raw CSV file.
pub fn read_raw_csv(path: &Path) -> Result<RawDataset, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::Open {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    read_raw(file)
}

/// Read raw CSV from any reader.
pub fn read_raw<R: Read>(reader: R) -> Result<RawDataset, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::Csv(format!("header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();
    validate_header(&headers)?;

    let index_of = |name: &str| headers.iter().position(|h| h == name);
    let date_idx = index_of(DATE_COLUMN).ok_or_else(|| SchemaError::MissingColumn(DATE_COLUMN.into()))?;
    let ticker_idx =
        index_of(TICKER_COLUMN).ok_or_else(|| SchemaError::MissingColumn(TICKER_COLUMN.into()))?;
    let value_idx: Vec<(Column, usize)> = Column::RAW
        .into_iter()
        .filter_map(|c| index_of(c.name()).map(|i| (c, i)))
        .collect();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| IngestError::Csv(format!("row {row}: {e}")))?;
        let field = |i: usize| record.get(i).unwrap_or("");

        let timestamp = parse_date(field(date_idx)).ok_or_else(|| SchemaError::InvalidValue {
            column: DATE_COLUMN.into(),
            row,
            value: field(date_idx).to_string(),
        })?;
        let mut raw = RawRecord::new(field(ticker_idx), timestamp);
        for &(column, i) in &value_idx {
            let value = parse_value(field(i)).ok_or_else(|| SchemaError::InvalidValue {
                column: column.name().into(),
                row,
                value: field(i).to_string(),
            })?;
            raw.values.set(column, value);
        }
        records.push(raw);
    }

    Ok(RawDataset {
        columns: headers,
        records,
    })
}

/// `YYYY-MM-DD`, optionally followed by a time component that is ignored.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_value(s: &str) -> Option<f64> {
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    s.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Date,Ticker,Open,High,Low,Close,Adj Close,Volume
2024-05-01,NOK,5.0,5.2,4.9,5.1,5.1,1000
2024-05-02 00:00:00,NOK,,5.3,5.0,5.2,5.2,1200
2024-05-01,MSFT,NaN,41.0,39.5,40.0,40.0,900
";

    #[test]
    fn reads_header_and_rows() {
        let ds = read_raw(SAMPLE.as_bytes()).unwrap();
        assert_eq!(ds.len(), 3);
        assert!(ds.has_column("Adj Close"));
        assert_eq!(ds.raw_columns().len(), 6);

        let nok = &ds.records[1];
        assert_eq!(nok.instrument_id, "NOK");
        assert_eq!(nok.timestamp, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert!(nok.value(Column::Open).is_nan());
        assert_eq!(nok.value(Column::Close), 5.2);
        assert!(ds.records[2].value(Column::Open).is_nan());
    }

    #[test]
    fn adj_close_is_optional() {
        let csv = "Date,Ticker,Open,High,Low,Close,Volume\n2024-01-02,SPY,1,2,0.5,1.5,10\n";
        let ds = read_raw(csv.as_bytes()).unwrap();
        assert!(!ds.has_column("Adj Close"));
        assert!(!ds.records[0].values.contains(Column::AdjClose));
    }

    #[test]
    fn missing_ticker_column_is_a_schema_error() {
        let csv = "Date,Open,High,Low,Close,Volume\n2024-01-02,1,2,0.5,1.5,10\n";
        assert!(matches!(
            read_raw(csv.as_bytes()),
            Err(IngestError::Schema(SchemaError::MissingColumn(c))) if c == "Ticker"
        ));
    }

    #[test]
    fn garbage_number_is_reported_with_row() {
        let csv = "Date,Ticker,Open,High,Low,Close,Volume\n2024-01-02,SPY,1,2,0.5,abc,10\n";
        match read_raw(csv.as_bytes()) {
            Err(IngestError::Schema(SchemaError::InvalidValue { column, row, value })) => {
                assert_eq!(column, "Close");
                assert_eq!(row, 0);
                assert_eq!(value, "abc");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }
}
