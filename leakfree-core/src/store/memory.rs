//! In-memory processed store, for tests and dry runs.

use super::{check_append, ProcessedStore, StoreError};
use crate::domain::FeatureRow;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, Vec<FeatureRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessedStore for MemoryStore {
    fn instruments(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn load(&self, instrument_id: &str) -> Result<Vec<FeatureRow>, StoreError> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.get(instrument_id).cloned().unwrap_or_default())
    }

    fn append(&self, instrument_id: &str, new_rows: &[FeatureRow]) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = rows.entry(instrument_id.to_string()).or_default();
        check_append(instrument_id, existing.last().map(|r| r.timestamp), new_rows)?;
        existing.extend_from_slice(new_rows);
        Ok(())
    }

    fn replace(&self, instrument_id: &str, new_rows: &[FeatureRow]) -> Result<(), StoreError> {
        check_append(instrument_id, None, new_rows)?;
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.insert(instrument_id.to_string(), new_rows.to_vec());
        Ok(())
    }
}
