//! Independent re-derivation of derived columns.
//!
//! These loops share no code with the feature engine. Each
//! expected value is written out from its definition over the processed
//! closes of one instrument.

use crate::domain::{Causality, Column, FeatureRow};
use crate::normalize::NormalizationState;

/// Result of re-deriving one column over one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Rederivation {
    pub column: Column,
    /// Rows where an expected value was computable.
    pub checked: usize,
    pub mismatches: usize,
    /// Mismatching rows that instead match the same-day (unshifted) formula.
    pub same_day_matches: usize,
}

/// Column values of `rows` in raw scale. With a state, scaled values are
/// inverted; without one, values are taken as stored.
pub fn raw_values(
    rows: &[FeatureRow],
    column: Column,
    state: Option<&NormalizationState>,
) -> Option<Vec<f64>> {
    if !rows.first()?.values.contains(column) {
        return None;
    }
    Some(
        rows.iter()
            .map(|r| {
                let v = r.value(column);
                match state {
                    Some(s) => s.inverse_value(column, v).unwrap_or(f64::NAN),
                    None => v,
                }
            })
            .collect(),
    )
}

fn within(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance * expected.abs().max(1.0)
}

/// Expected values at `i` under the column's definition, from raw closes.
fn expected_at(column: Column, closes: &[f64], i: usize) -> Option<f64> {
    match column {
        Column::LagReturn1 if i >= 2 => Some(closes[i - 1] / closes[i - 2] - 1.0),
        Column::LogReturn if i >= 1 => Some((closes[i] / closes[i - 1]).ln()),
        Column::Sma20 if i >= 19 => {
            let mut sum = 0.0;
            for c in &closes[i - 19..=i] {
                sum += c;
            }
            Some(sum / 20.0)
        }
        _ => None,
    }
}

/// The formula a shifted column would have if the shift were missing.
fn unshifted_at(column: Column, closes: &[f64], i: usize) -> Option<f64> {
    match column {
        Column::LagReturn1 if i >= 1 => Some(closes[i] / closes[i - 1] - 1.0),
        _ => None,
    }
}

/// Columns this module can re-derive.
pub fn rederivable(column: Column) -> bool {
    matches!(
        column,
        Column::LagReturn1 | Column::LogReturn | Column::Sma20
    )
}

/// Re-derive `column` over one instrument's rows (timestamp order) and count
/// mismatches against the stored values, both in raw scale.
pub fn rederive(
    rows: &[FeatureRow],
    column: Column,
    state: Option<&NormalizationState>,
    tolerance: f64,
) -> Option<Rederivation> {
    if !rederivable(column) {
        return None;
    }
    let closes = raw_values(rows, Column::Close, state)?;
    let actual = raw_values(rows, column, state)?;

    let mut out = Rederivation {
        column,
        checked: 0,
        mismatches: 0,
        same_day_matches: 0,
    };
    for i in 0..rows.len() {
        let Some(expected) = expected_at(column, &closes, i) else {
            continue;
        };
        if !expected.is_finite() || !actual[i].is_finite() {
            continue;
        }
        out.checked += 1;
        if !within(actual[i], expected, tolerance) {
            out.mismatches += 1;
            if let Some(same_day) = unshifted_at(column, &closes, i) {
                if within(actual[i], same_day, tolerance) {
                    out.same_day_matches += 1;
                }
            }
        }
    }
    Some(out)
}

/// True when a mismatch on `column` suggests lookahead rather than plain
/// corruption.
pub fn is_shifted(column: Column) -> bool {
    matches!(column.causality(), Causality::Shifted(_))
}
