//! JSONL audit export adapter.
//!
//! Reads one event per line from audit-log export files. Unparseable lines
//! are logged and skipped so a single corrupt record never kills a fetch;
//! a missing or unreadable file is a source failure and aborts the run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use itd_core::{DetectorError, ExfilEvent, ReconEvent};

use super::AuditSource;

#[derive(Debug, Clone, Default)]
pub struct JsonlAuditSource {
    recon_path: Option<PathBuf>,
    exfil_path: Option<PathBuf>,
}

impl JsonlAuditSource {
    pub fn new(recon_path: Option<PathBuf>, exfil_path: Option<PathBuf>) -> Self {
        Self {
            recon_path,
            exfil_path,
        }
    }

    fn read_events<T: DeserializeOwned>(
        path: &Path,
        stream: &str,
    ) -> Result<Vec<(T, DateTime<Utc>)>, DetectorError>
    where
        T: HasTimestamp,
    {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DetectorError::SourceUnavailable(format!("{} log {}: {}", stream, path.display(), e))
        })?;

        let mut events = Vec::new();
        let mut skipped = 0usize;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(event) => {
                    let ts = event.timestamp();
                    events.push((event, ts));
                }
                Err(err) => {
                    skipped += 1;
                    tracing::info!(
                        "skipping malformed {} record at {}:{}: {}",
                        stream,
                        path.display(),
                        line_no + 1,
                        err
                    );
                }
            }
        }
        if skipped > 0 {
            tracing::info!("skipped {} malformed {} records", skipped, stream);
        }
        Ok(events)
    }
}

trait HasTimestamp {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl HasTimestamp for ReconEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl HasTimestamp for ExfilEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl AuditSource for JsonlAuditSource {
    fn fetch_recon(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ReconEvent>, DetectorError> {
        let Some(path) = &self.recon_path else {
            return Ok(Vec::new());
        };
        let events = Self::read_events::<ReconEvent>(path, "recon")?;
        Ok(events
            .into_iter()
            .filter(|(_, ts)| *ts >= start && *ts <= end)
            .map(|(event, _)| event)
            .collect())
    }

    fn fetch_exfil(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExfilEvent>, DetectorError> {
        let Some(path) = &self.exfil_path else {
            return Ok(Vec::new());
        };
        let events = Self::read_events::<ExfilEvent>(path, "exfil")?;
        Ok(events
            .into_iter()
            .filter(|(_, ts)| *ts >= start && *ts <= end)
            .map(|(event, _)| event)
            .collect())
    }
}
