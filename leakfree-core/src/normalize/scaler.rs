//! Per-instrument min-max scaling.
//!
//! `x' = (x - min) / (max - min)`, and 0 when `max == min`. A fitted state is
//! immutable; new rows are transformed with the old range even when they
//! fall outside [0, 1].

use crate::domain::{Column, FeatureRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("cannot fit a scaler for '{instrument}' on zero rows")]
    EmptyFit { instrument: String },

    #[error("non-finite value in column {column} while fitting '{instrument}'")]
    NonFinite { instrument: String, column: Column },

    #[error("column set mismatch for '{instrument}': scaler has {expected:?}, row has {found:?}")]
    ColumnMismatch {
        instrument: String,
        expected: Vec<Column>,
        found: Vec<Column>,
    },

    #[error("scaler for '{expected}' applied to row of '{found}'")]
    WrongInstrument { expected: String, found: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub min: f64,
    pub max: f64,
}

impl ColumnRange {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn transform(&self, x: f64) -> f64 {
        let span = self.span();
        if span == 0.0 {
            0.0
        } else {
            (x - self.min) / span
        }
    }

    /// Inverse of [`transform`](Self::transform). A degenerate range maps
    /// everything back to `min`.
    pub fn inverse(&self, scaled: f64) -> f64 {
        let span = self.span();
        if span == 0.0 {
            self.min
        } else {
            scaled * span + self.min
        }
    }
}

/// Fitted min/max per column for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationState {
    pub instrument_id: String,
    pub columns: BTreeMap<Column, ColumnRange>,
    /// Last timestamp of the rows the state was fitted on.
    pub fitted_through: NaiveDate,
    pub fitted_rows: usize,
}

impl NormalizationState {
    /// Fit on `rows`, all of which must belong to `instrument_id` and carry
    /// finite values in every present column.
    pub fn fit(instrument_id: &str, rows: &[FeatureRow]) -> Result<Self, NormalizeError> {
        let Some(first) = rows.first() else {
            return Err(NormalizeError::EmptyFit {
                instrument: instrument_id.to_string(),
            });
        };
        let columns = first.values.columns();
        let mut ranges: BTreeMap<Column, ColumnRange> = BTreeMap::new();
        let mut fitted_through = first.timestamp;

        for row in rows {
            check_row(instrument_id, &columns, row)?;
            fitted_through = fitted_through.max(row.timestamp);
            for &c in &columns {
                let v = row.value(c);
                if !v.is_finite() {
                    return Err(NormalizeError::NonFinite {
                        instrument: instrument_id.to_string(),
                        column: c,
                    });
                }
                ranges
                    .entry(c)
                    .and_modify(|r| {
                        r.min = r.min.min(v);
                        r.max = r.max.max(v);
                    })
                    .or_insert(ColumnRange { min: v, max: v });
            }
        }

        Ok(Self {
            instrument_id: instrument_id.to_string(),
            columns: ranges,
            fitted_through,
            fitted_rows: rows.len(),
        })
    }

    pub fn column_list(&self) -> Vec<Column> {
        self.columns.keys().copied().collect()
    }

    pub fn range(&self, column: Column) -> Option<&ColumnRange> {
        self.columns.get(&column)
    }

    /// Scale every column of `row` in place. The label is left untouched.
    pub fn transform_row(&self, row: &mut FeatureRow) -> Result<(), NormalizeError> {
        check_row(&self.instrument_id, &self.column_list(), row)?;
        for (&c, range) in &self.columns {
            let v = row.value(c);
            row.values.set(c, range.transform(v));
        }
        Ok(())
    }

    pub fn transform_rows(&self, rows: &mut [FeatureRow]) -> Result<(), NormalizeError> {
        for row in rows {
            self.transform_row(row)?;
        }
        Ok(())
    }

    /// Raw-scale value of a scaled `column` value, if the column is fitted.
    pub fn inverse_value(&self, column: Column, scaled: f64) -> Option<f64> {
        self.columns.get(&column).map(|r| r.inverse(scaled))
    }
}

fn check_row(instrument_id: &str, columns: &[Column], row: &FeatureRow) -> Result<(), NormalizeError> {
    if row.instrument_id != instrument_id {
        return Err(NormalizeError::WrongInstrument {
            expected: instrument_id.to_string(),
            found: row.instrument_id.clone(),
        });
    }
    let found = row.values.columns();
    if found != columns {
        return Err(NormalizeError::ColumnMismatch {
            instrument: instrument_id.to_string(),
            expected: columns.to_vec(),
            found,
        });
    }
    Ok(())
}

/// Scaler lifecycle for one instrument: `Unfit → Fit(params)`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalerState {
    Unfit,
    Fit(NormalizationState),
}

impl ScalerState {
    pub fn is_fit(&self) -> bool {
        matches!(self, ScalerState::Fit(_))
    }

    pub fn as_fit(&self) -> Option<&NormalizationState> {
        match self {
            ScalerState::Fit(s) => Some(s),
            ScalerState::Unfit => None,
        }
    }
}

/// What happened to the scaler during one normalization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerTransition {
    /// `Unfit → Fit`: first fit on this instrument.
    Fitted,
    /// `Fit → Fit` with the same parameters.
    Reused,
    /// `Fit → Fit` with new parameters, on explicit request only.
    Refitted,
}

/// Apply the scaler state machine to `rows`.
///
/// Fits when the state is unfit or a refit is requested, otherwise reuses the
/// persisted state unchanged. Returns the state to persist and the transition
/// taken.
pub fn normalize_rows(
    instrument_id: &str,
    state: ScalerState,
    refit: bool,
    rows: &mut [FeatureRow],
) -> Result<(NormalizationState, ScalerTransition), NormalizeError> {
    let (fitted, transition) = match state {
        ScalerState::Unfit => (NormalizationState::fit(instrument_id, rows)?, ScalerTransition::Fitted),
        ScalerState::Fit(_) if refit => (
            NormalizationState::fit(instrument_id, rows)?,
            ScalerTransition::Refitted,
        ),
        ScalerState::Fit(existing) => (existing, ScalerTransition::Reused),
    };
    fitted.transform_rows(rows)?;
    Ok((fitted, transition))
}
