//! Per-actor cumulative recon score with exponential time decay.
//!
//! The score is the engine's memory of sustained assistant usage: each recon
//! observation adds its action weight to a decayed running total, and exfil
//! evaluation reads the decayed value without mutating it. Backends implement
//! a narrow contract (`get`, `put_cas`, `delete_if_below`) so the in-memory
//! and remote KV stores stay symmetric; per-actor mutual exclusion lives in
//! the backend (a local mutex, or a watched transaction in the KV).

pub mod memory;
pub mod kv;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use itd_core::time::elapsed_hours;
use itd_core::{DetectorError, ReconAction};

pub use memory::MemoryReconBackend;
pub use kv::RedisReconBackend;

/// Cumulative score never exceeds this ceiling.
pub const SCORE_CEILING: f64 = 100.0;

/// Entries whose decayed score falls below this floor are evicted.
pub const EVICTION_FLOOR: f64 = 0.1;

/// Bounded CAS attempts before an update is dropped as contended.
const CAS_ATTEMPTS: u32 = 5;

/// Stored score state for one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconScoreEntry {
    pub score: f64,
    pub last_update_ts: DateTime<Utc>,
}

impl ReconScoreEntry {
    /// Score as of `at`, with decay applied. Reads before `last_update_ts`
    /// see the undecayed value.
    pub fn decayed_at(&self, at: DateTime<Utc>, half_life_hours: f64) -> f64 {
        self.score * decay_factor(elapsed_hours(at, self.last_update_ts), half_life_hours)
    }
}

/// Exponential decay multiplier for `hours` of elapsed time.
pub fn decay_factor(hours: f64, half_life_hours: f64) -> f64 {
    0.5_f64.powf(hours / half_life_hours)
}

/// Storage contract for recon score state.
///
/// `put_cas` is compare-and-set against the entry the caller previously read
/// (`None` for "no entry"); it returns false when the stored state moved
/// underneath the caller. `delete_if_below` atomically drops an entry whose
/// decayed score is under `floor` as of `at`.
pub trait ReconStateBackend: Send + Sync {
    fn get(&self, actor: &str) -> Result<Option<ReconScoreEntry>, DetectorError>;

    fn put_cas(
        &self,
        actor: &str,
        expected: Option<&ReconScoreEntry>,
        next: &ReconScoreEntry,
    ) -> Result<bool, DetectorError>;

    fn delete_if_below(
        &self,
        actor: &str,
        floor: f64,
        at: DateTime<Utc>,
    ) -> Result<(), DetectorError>;
}

/// The recon state store: decay-and-add on observation, decayed read on
/// evaluation. Observation failures are logged and dropped (recon tracking
/// is best-effort); read failures fail open to a zero score.
pub struct ReconTracker {
    backend: Arc<dyn ReconStateBackend>,
    half_life_hours: f64,
}

impl ReconTracker {
    pub fn new(backend: Arc<dyn ReconStateBackend>, half_life_hours: f64) -> Self {
        Self {
            backend,
            half_life_hours,
        }
    }

    /// Fold one recon observation into the actor's score.
    pub fn observe_recon(&self, actor: &str, action: ReconAction, ts: DateTime<Utc>) {
        if let Err(err) = self.try_observe(actor, action, ts) {
            tracing::warn!("recon score update dropped for {}: {}", actor, err);
        }
    }

    fn try_observe(
        &self,
        actor: &str,
        action: ReconAction,
        ts: DateTime<Utc>,
    ) -> Result<(), DetectorError> {
        for _ in 0..CAS_ATTEMPTS {
            let current = self.backend.get(actor)?;
            let decayed = current
                .as_ref()
                .map(|e| e.decayed_at(ts, self.half_life_hours))
                .unwrap_or(0.0);
            // Keep last_update_ts monotonic so out-of-order observations
            // never rewind decay.
            let next_ts = match &current {
                Some(e) if e.last_update_ts > ts => e.last_update_ts,
                _ => ts,
            };
            let next = ReconScoreEntry {
                score: (decayed + action.weight()).min(SCORE_CEILING),
                last_update_ts: next_ts,
            };
            if self.backend.put_cas(actor, current.as_ref(), &next)? {
                return Ok(());
            }
        }
        Err(DetectorError::Internal(format!(
            "recon score CAS contention for {}",
            actor
        )))
    }

    /// Decayed score as of `at`. Never mutates state, other than triggering
    /// best-effort eviction of entries that have decayed away.
    pub fn current_score(&self, actor: &str, at: DateTime<Utc>) -> f64 {
        match self.backend.get(actor) {
            Ok(Some(entry)) => {
                let score = entry.decayed_at(at, self.half_life_hours);
                if score < EVICTION_FLOOR {
                    if let Err(err) = self.backend.delete_if_below(actor, EVICTION_FLOOR, at) {
                        tracing::debug!("recon score eviction skipped for {}: {}", actor, err);
                    }
                }
                score
            }
            Ok(None) => 0.0,
            Err(err) => {
                tracing::warn!("recon score read failed for {}, assuming 0: {}", actor, err);
                0.0
            }
        }
    }

    pub fn half_life_hours(&self) -> f64 {
        self.half_life_hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itd_core::time::utc;

    fn tracker() -> ReconTracker {
        ReconTracker::new(Arc::new(MemoryReconBackend::new(48.0)), 48.0)
    }

    #[test]
    fn test_weight_accumulates() {
        let t = tracker();
        let ts = utc(2025, 1, 15, 10, 0, 0);
        t.observe_recon("u@x.com", ReconAction::SummarizeFile, ts);
        t.observe_recon("u@x.com", ReconAction::SearchWeb, ts);
        let score = t.current_score("u@x.com", ts);
        assert!((score - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_half_life_identity() {
        let t = tracker();
        let ts = utc(2025, 1, 15, 10, 0, 0);
        t.observe_recon("u@x.com", ReconAction::AnalyzeDocuments, ts);

        let at = ts + chrono::Duration::hours(48);
        let now_score = t.current_score("u@x.com", ts);
        let later_score = t.current_score("u@x.com", at);
        assert!((later_score - now_score * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decay_is_monotonic() {
        let t = tracker();
        let ts = utc(2025, 1, 15, 10, 0, 0);
        t.observe_recon("u@x.com", ReconAction::CatchMeUp, ts);

        let mut previous = f64::MAX;
        for hours in [0i64, 1, 7, 23, 48, 100, 400] {
            let score = t.current_score("u@x.com", ts + chrono::Duration::hours(hours));
            assert!(score <= previous, "score rose after {} hours", hours);
            previous = score;
        }
    }

    #[test]
    fn test_score_ceiling() {
        let t = tracker();
        let ts = utc(2025, 1, 15, 10, 0, 0);
        for _ in 0..100 {
            t.observe_recon("u@x.com", ReconAction::AnalyzeDocuments, ts);
        }
        assert!(t.current_score("u@x.com", ts) <= SCORE_CEILING);
    }

    #[test]
    fn test_unknown_actor_scores_zero() {
        let t = tracker();
        assert_eq!(t.current_score("ghost@x.com", utc(2025, 1, 15, 0, 0, 0)), 0.0);
    }

    #[test]
    fn test_eviction_below_floor() {
        let backend = Arc::new(MemoryReconBackend::new(1.0));
        let t = ReconTracker::new(backend.clone(), 1.0);
        let ts = utc(2025, 1, 15, 0, 0, 0);
        t.observe_recon("u@x.com", ReconAction::Proofread, ts);

        // 0.5 halves every hour; after 4 hours it is 0.03125, under the floor.
        let later = ts + chrono::Duration::hours(4);
        let score = t.current_score("u@x.com", later);
        assert!(score < EVICTION_FLOOR);
        assert!(backend.get("u@x.com").unwrap().is_none());
    }

    #[test]
    fn test_out_of_order_observation_keeps_decay_monotonic() {
        let t = tracker();
        let late = utc(2025, 1, 15, 12, 0, 0);
        let early = utc(2025, 1, 15, 10, 0, 0);
        t.observe_recon("u@x.com", ReconAction::SummarizeFile, late);
        t.observe_recon("u@x.com", ReconAction::SummarizeFile, early);

        let s1 = t.current_score("u@x.com", utc(2025, 1, 15, 13, 0, 0));
        let s2 = t.current_score("u@x.com", utc(2025, 1, 15, 14, 0, 0));
        assert!(s2 <= s1);
    }
}
