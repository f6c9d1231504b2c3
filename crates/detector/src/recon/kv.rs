//! Remote KV recon state backend.
//!
//! State lives under `recon_score:<actor>` as JSON `{score, last_update_ts}`
//! with the shared state TTL. The read-modify-write is a single watched
//! pipelined transaction per actor, which serializes `observe_recon` across
//! concurrent detector processes sweeping the same tenant.

use chrono::{DateTime, Utc};
use redis::Commands;

use itd_core::DetectorError;

use crate::kv::{transient, RedisKv};
use crate::util::{with_retry, BACKEND_RETRIES, RETRY_BACKOFF};

use super::{ReconScoreEntry, ReconStateBackend};

pub struct RedisReconBackend {
    kv: RedisKv,
    half_life_hours: f64,
}

impl RedisReconBackend {
    pub fn new(kv: RedisKv, half_life_hours: f64) -> Self {
        Self { kv, half_life_hours }
    }

    fn key(actor: &str) -> String {
        format!("recon_score:{}", actor)
    }

    fn parse(raw: Option<&str>) -> Option<ReconScoreEntry> {
        let raw = raw?;
        match serde_json::from_str(raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("discarding malformed recon score entry: {}", err);
                None
            }
        }
    }
}

impl ReconStateBackend for RedisReconBackend {
    fn get(&self, actor: &str) -> Result<Option<ReconScoreEntry>, DetectorError> {
        let raw = self.kv.get_raw(&Self::key(actor))?;
        Ok(Self::parse(raw.as_deref()))
    }

    fn put_cas(
        &self,
        actor: &str,
        expected: Option<&ReconScoreEntry>,
        next: &ReconScoreEntry,
    ) -> Result<bool, DetectorError> {
        let key = Self::key(actor);
        let payload = serde_json::to_string(next)
            .map_err(|e| DetectorError::Internal(format!("recon entry encode: {}", e)))?;
        let ttl = self.kv.ttl_seconds();

        with_retry("kv recon cas", BACKEND_RETRIES, RETRY_BACKOFF, || {
            let mut con = self.kv.connection()?;
            redis::transaction(&mut con, &[key.as_str()], |con, pipe| {
                let raw: Option<String> = con.get(&key)?;
                let current = Self::parse(raw.as_deref());
                if current.as_ref() != expected {
                    return Ok(Some(false));
                }
                let exec: Option<()> = pipe.set_ex(&key, &payload, ttl).ignore().query(con)?;
                Ok(exec.map(|_| true))
            })
            .map_err(transient)
        })
    }

    fn delete_if_below(
        &self,
        actor: &str,
        floor: f64,
        at: DateTime<Utc>,
    ) -> Result<(), DetectorError> {
        let key = Self::key(actor);
        let half_life = self.half_life_hours;

        with_retry("kv recon evict", BACKEND_RETRIES, RETRY_BACKOFF, || {
            let mut con = self.kv.connection()?;
            redis::transaction(&mut con, &[key.as_str()], |con, pipe| {
                let raw: Option<String> = con.get(&key)?;
                match Self::parse(raw.as_deref()) {
                    Some(entry) if entry.decayed_at(at, half_life) < floor => {
                        let exec: Option<()> = pipe.del(&key).ignore().query(con)?;
                        Ok(exec.map(|_| ()))
                    }
                    _ => Ok(Some(())),
                }
            })
            .map_err(transient)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(
            RedisReconBackend::key("u@x.com"),
            "recon_score:u@x.com"
        );
    }

    #[test]
    fn test_parse_tolerates_garbage() {
        assert!(RedisReconBackend::parse(Some("not json")).is_none());
        assert!(RedisReconBackend::parse(None).is_none());
        let entry = RedisReconBackend::parse(Some(
            "{\"score\":2.5,\"last_update_ts\":\"2025-01-15T10:00:00Z\"}",
        ))
        .unwrap();
        assert_eq!(entry.score, 2.5);
    }
}
