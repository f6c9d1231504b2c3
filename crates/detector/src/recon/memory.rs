//! Ephemeral recon state backend.
//!
//! A mutex-guarded map; the lock gives the same per-actor serialization the
//! KV backend gets from its watched transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use itd_core::DetectorError;

use super::{ReconScoreEntry, ReconStateBackend};

pub struct MemoryReconBackend {
    entries: Mutex<HashMap<String, ReconScoreEntry>>,
    half_life_hours: f64,
}

impl MemoryReconBackend {
    pub fn new(half_life_hours: f64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            half_life_hours,
        }
    }
}

impl ReconStateBackend for MemoryReconBackend {
    fn get(&self, actor: &str) -> Result<Option<ReconScoreEntry>, DetectorError> {
        Ok(self.entries.lock().get(actor).cloned())
    }

    fn put_cas(
        &self,
        actor: &str,
        expected: Option<&ReconScoreEntry>,
        next: &ReconScoreEntry,
    ) -> Result<bool, DetectorError> {
        let mut entries = self.entries.lock();
        if entries.get(actor) != expected {
            return Ok(false);
        }
        entries.insert(actor.to_string(), next.clone());
        Ok(true)
    }

    fn delete_if_below(
        &self,
        actor: &str,
        floor: f64,
        at: DateTime<Utc>,
    ) -> Result<(), DetectorError> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(actor) {
            if entry.decayed_at(at, self.half_life_hours) < floor {
                entries.remove(actor);
            }
        }
        Ok(())
    }
}
