//! Input and output schema checks.

use crate::domain::{Column, RawDataset, DATE_COLUMN, TICKER_COLUMN};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("target column '{0}' missing after label generation")]
    MissingTarget(String),

    #[error("invalid value '{value}' in column {column} at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("empty instrument identifier at row {row}")]
    EmptyInstrument { row: usize },

    #[error("instrument identifier '{instrument}' at row {row} is not a valid partition name")]
    InvalidInstrument { instrument: String, row: usize },
}

/// Columns every raw input must carry. `Adj Close` is optional.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    DATE_COLUMN,
    TICKER_COLUMN,
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
];

/// Verify the instrument identifier column is present.
///
/// This is the only hard requirement of the partitioner; price columns are
/// checked by the feature engine, which knows which ones it needs.
pub fn require_instrument_column(dataset: &RawDataset) -> Result<(), SchemaError> {
    if dataset.has_column(TICKER_COLUMN) {
        Ok(())
    } else {
        Err(SchemaError::MissingColumn(TICKER_COLUMN.to_string()))
    }
}

/// Instrument ids become directory names under the processed store, so they
/// must not contain path separators or resolve to `.`/`..`.
pub fn check_instrument_id(id: &str, row: usize) -> Result<(), SchemaError> {
    if id.trim().is_empty() {
        return Err(SchemaError::EmptyInstrument { row });
    }
    let bad = id.contains(['/', '\\', '\0']) || id == "." || id.contains("..");
    if bad {
        return Err(SchemaError::InvalidInstrument {
            instrument: id.to_string(),
            row,
        });
    }
    Ok(())
}

/// Full input header check: every required column present.
pub fn validate_header(columns: &[String]) -> Result<(), SchemaError> {
    for required in REQUIRED_COLUMNS {
        if !columns.iter().any(|c| c == required) {
            return Err(SchemaError::MissingColumn(required.to_string()));
        }
    }
    Ok(())
}

/// Fail unless `column` is among `present`.
pub fn require_column(present: &[Column], column: Column) -> Result<(), SchemaError> {
    if present.contains(&column) {
        Ok(())
    } else {
        Err(SchemaError::MissingColumn(column.name().to_string()))
    }
}
