//! Fold-local scaling: fit on a fold's training rows only.

use super::scaler::{NormalizationState, NormalizeError};
use crate::domain::FeatureRow;
use crate::split::SplitFold;
use std::collections::BTreeMap;

/// Per-instrument scalers fitted on one fold's training side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoldScaler {
    states: BTreeMap<String, NormalizationState>,
}

impl FoldScaler {
    /// Fit one state per instrument on `fold.train_rows`. Instruments with no
    /// training rows get no state.
    pub fn fit_on_train(fold: &SplitFold) -> Result<Self, NormalizeError> {
        let mut grouped: BTreeMap<&str, Vec<FeatureRow>> = BTreeMap::new();
        for row in &fold.train_rows {
            grouped
                .entry(row.instrument_id.as_str())
                .or_default()
                .push(row.clone());
        }
        let mut states = BTreeMap::new();
        for (id, rows) in grouped {
            states.insert(id.to_string(), NormalizationState::fit(id, &rows)?);
        }
        Ok(Self { states })
    }

    pub fn state(&self, instrument_id: &str) -> Option<&NormalizationState> {
        self.states.get(instrument_id)
    }

    pub fn states(&self) -> &BTreeMap<String, NormalizationState> {
        &self.states
    }

    /// Scaled copies of `rows`. Rows of instruments without a fitted state
    /// are dropped: there is no training history to scale them by.
    pub fn apply(&self, rows: &[FeatureRow]) -> Result<Vec<FeatureRow>, NormalizeError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(state) = self.states.get(&row.instrument_id) {
                let mut scaled = row.clone();
                state.transform_row(&mut scaled)?;
                out.push(scaled);
            }
        }
        Ok(out)
    }
}
