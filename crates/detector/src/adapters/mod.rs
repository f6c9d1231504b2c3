//! Audit-log source adapters.
//!
//! Sources hand the engine two time-bounded, unordered event sequences.
//! The real Workspace API client lives outside this repo; shipped here are
//! the JSONL export adapter used for offline runs and a fixed in-memory
//! source for tests. A failed fetch is fatal for the run (exit code 2).

pub mod jsonl;

use chrono::{DateTime, Utc};

use itd_core::{DetectorError, ExfilEvent, ReconEvent};

pub use jsonl::JsonlAuditSource;

pub trait AuditSource {
    fn fetch_recon(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ReconEvent>, DetectorError>;

    fn fetch_exfil(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExfilEvent>, DetectorError>;
}

/// Fixed event source for tests and fixtures.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSource {
    pub recon: Vec<ReconEvent>,
    pub exfil: Vec<ExfilEvent>,
}

impl MemoryAuditSource {
    pub fn new(recon: Vec<ReconEvent>, exfil: Vec<ExfilEvent>) -> Self {
        Self { recon, exfil }
    }
}

impl AuditSource for MemoryAuditSource {
    fn fetch_recon(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ReconEvent>, DetectorError> {
        Ok(self
            .recon
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect())
    }

    fn fetch_exfil(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExfilEvent>, DetectorError> {
        Ok(self
            .exfil
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect())
    }
}
