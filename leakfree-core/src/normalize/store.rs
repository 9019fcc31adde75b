//! NormalizationState persistence, one record per instrument.

use super::scaler::{NormalizationState, ScalerState};
use crate::store::StoreError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub trait ScalerStore: Send + Sync {
    /// `Unfit` when nothing is persisted for the instrument.
    fn load(&self, instrument_id: &str) -> Result<ScalerState, StoreError>;

    fn save(&self, state: &NormalizationState) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryScalerStore {
    states: Mutex<HashMap<String, NormalizationState>>,
}

impl MemoryScalerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScalerStore for MemoryScalerStore {
    fn load(&self, instrument_id: &str) -> Result<ScalerState, StoreError> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(states
            .get(instrument_id)
            .cloned()
            .map_or(ScalerState::Unfit, ScalerState::Fit))
    }

    fn save(&self, state: &NormalizationState) -> Result<(), StoreError> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(state.instrument_id.clone(), state.clone());
        Ok(())
    }
}

/// JSON files at `{dir}/instrument={ID}/scaler.json`, next to the processed
/// partition of the same instrument.
pub struct JsonScalerStore {
    dir: PathBuf,
}

impl JsonScalerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, instrument_id: &str) -> PathBuf {
        self.dir
            .join(format!("instrument={instrument_id}"))
            .join("scaler.json")
    }
}

impl ScalerStore for JsonScalerStore {
    fn load(&self, instrument_id: &str) -> Result<ScalerState, StoreError> {
        let path = self.path(instrument_id);
        if !path.exists() {
            return Ok(ScalerState::Unfit);
        }
        let content =
            fs::read_to_string(&path).map_err(|e| StoreError::Io(format!("scaler read: {e}")))?;
        let state: NormalizationState =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                instrument: instrument_id.to_string(),
                reason: format!("scaler.json: {e}"),
            })?;
        Ok(ScalerState::Fit(state))
    }

    fn save(&self, state: &NormalizationState) -> Result<(), StoreError> {
        let path = self.path(&state.instrument_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("failed to create dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Serialization(format!("scaler serialization: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::Io(format!("scaler write: {e}")))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(format!("atomic rename failed: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Column, FeatureRow};
    use chrono::NaiveDate;

    fn state() -> NormalizationState {
        let mut r = FeatureRow::new("QQQ", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        r.values.set(Column::Close, 3.0);
        NormalizationState::fit("QQQ", &[r]).unwrap()
    }

    #[test]
    fn json_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonScalerStore::new(dir.path());
        assert_eq!(store.load("QQQ").unwrap(), ScalerState::Unfit);
        store.save(&state()).unwrap();
        assert_eq!(store.load("QQQ").unwrap(), ScalerState::Fit(state()));
    }

    #[test]
    fn corrupt_scaler_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonScalerStore::new(dir.path());
        let path = store.path("QQQ");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(store.load("QQQ"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryScalerStore::new();
        store.save(&state()).unwrap();
        assert!(store.load("QQQ").unwrap().is_fit());
        assert!(!store.load("SPY").unwrap().is_fit());
    }
}
