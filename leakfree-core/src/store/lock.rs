//! Per-instrument exclusive access.
//!
//! One writer per instrument at a time; writes to different instruments
//! never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct InstrumentLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InstrumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `instrument_id`, created on first use.
    ///
    /// A panic in another holder poisons only that instrument's mutex; the
    /// data behind it is on disk, so callers recover the guard with
    /// `PoisonError::into_inner`.
    pub fn handle(&self, instrument_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(instrument_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
