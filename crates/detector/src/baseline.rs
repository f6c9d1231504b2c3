//! Per-actor rolling sharing baselines.
//!
//! Answers the three questions the intent classifier asks: has this actor
//! shared with this domain before, how often do they share externally, and
//! how much of their sharing targets their own files. Counts decay with a
//! 30-day half-life applied lazily on read, so a long-idle actor drifts
//! back toward cold start. The engine is the sole mutator; when the KV
//! backend is configured, baselines mirror to `baseline:<actor>`.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use itd_core::time::elapsed_hours;
use itd_core::ExfilEvent;

use crate::kv::RedisKv;
use crate::recon::decay_factor;

/// Rolling window: counts halve every 30 days.
pub const BASELINE_HALF_LIFE_HOURS: f64 = 30.0 * 24.0;

/// Below this many (decayed) observed events the tracker reports
/// insufficient history.
pub const MIN_HISTORY: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBaseline {
    pub actor: String,
    pub known_external_domains: BTreeSet<String>,
    pub external_share_count: f64,
    pub total_share_count: f64,
    pub own_share_count: f64,
    pub last_update_ts: DateTime<Utc>,
}

impl UserBaseline {
    fn new(actor: &str, ts: DateTime<Utc>) -> Self {
        Self {
            actor: actor.to_string(),
            known_external_domains: BTreeSet::new(),
            external_share_count: 0.0,
            total_share_count: 0.0,
            own_share_count: 0.0,
            last_update_ts: ts,
        }
    }

    fn decay_multiplier(&self, at: DateTime<Utc>) -> f64 {
        decay_factor(elapsed_hours(at, self.last_update_ts), BASELINE_HALF_LIFE_HOURS)
    }

    fn apply_decay(&mut self, at: DateTime<Utc>) {
        let m = self.decay_multiplier(at);
        self.external_share_count *= m;
        self.total_share_count *= m;
        self.own_share_count *= m;
        if at > self.last_update_ts {
            self.last_update_ts = at;
        }
    }
}

/// Baseline answers for one exfil evaluation, taken before the event is
/// folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineSnapshot {
    pub insufficient_history: bool,
    pub seen_domain: bool,
    pub external_share_frequency: f64,
    pub own_file_share_ratio: f64,
}

impl BaselineSnapshot {
    /// Cold-start snapshot: nothing is known about the actor.
    pub fn empty() -> Self {
        Self {
            insufficient_history: true,
            seen_domain: false,
            external_share_frequency: 0.0,
            own_file_share_ratio: 0.0,
        }
    }
}

pub struct UserBaselineTracker {
    baselines: RwLock<HashMap<String, UserBaseline>>,
    kv: Option<RedisKv>,
}

impl UserBaselineTracker {
    pub fn new(kv: Option<RedisKv>) -> Self {
        Self {
            baselines: RwLock::new(HashMap::new()),
            kv,
        }
    }

    fn key(actor: &str) -> String {
        format!("baseline:{}", actor)
    }

    /// Pull the actor's baseline into the local map, consulting the KV
    /// mirror on first access.
    fn ensure_loaded(&self, actor: &str, at: DateTime<Utc>) {
        if self.baselines.read().contains_key(actor) {
            return;
        }
        let restored = self.kv.as_ref().and_then(|kv| {
            match kv.get_raw(&Self::key(actor)) {
                Ok(Some(raw)) => match serde_json::from_str::<UserBaseline>(&raw) {
                    Ok(baseline) => Some(baseline),
                    Err(err) => {
                        tracing::warn!("discarding malformed baseline for {}: {}", actor, err);
                        None
                    }
                },
                Ok(None) => None,
                Err(err) => {
                    tracing::warn!("baseline load failed for {}: {}", actor, err);
                    None
                }
            }
        });
        let mut baselines = self.baselines.write();
        baselines
            .entry(actor.to_string())
            .or_insert_with(|| restored.unwrap_or_else(|| UserBaseline::new(actor, at)));
    }

    pub fn has_seen_domain(&self, actor: &str, domain: &str, at: DateTime<Utc>) -> bool {
        self.ensure_loaded(actor, at);
        let baselines = self.baselines.read();
        baselines
            .get(actor)
            .map(|b| b.known_external_domains.contains(&domain.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// External shares per day over the rolling window.
    pub fn external_share_frequency(&self, actor: &str, at: DateTime<Utc>) -> f64 {
        self.ensure_loaded(actor, at);
        let baselines = self.baselines.read();
        baselines
            .get(actor)
            .map(|b| b.external_share_count * b.decay_multiplier(at) / 30.0)
            .unwrap_or(0.0)
    }

    /// Fraction of the actor's sharing that targets files they own.
    pub fn own_file_share_ratio(&self, actor: &str, at: DateTime<Utc>) -> f64 {
        self.ensure_loaded(actor, at);
        let baselines = self.baselines.read();
        baselines
            .get(actor)
            .map(|b| {
                if b.total_share_count > 0.0 {
                    b.own_share_count / b.total_share_count
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0)
    }

    pub fn insufficient_history(&self, actor: &str, at: DateTime<Utc>) -> bool {
        self.ensure_loaded(actor, at);
        let baselines = self.baselines.read();
        baselines
            .get(actor)
            .map(|b| b.total_share_count * b.decay_multiplier(at) < MIN_HISTORY)
            .unwrap_or(true)
    }

    /// All baseline answers for one evaluation, taken atomically.
    pub fn snapshot(
        &self,
        actor: &str,
        destination_domain: Option<&str>,
        at: DateTime<Utc>,
    ) -> BaselineSnapshot {
        self.ensure_loaded(actor, at);
        let baselines = self.baselines.read();
        let Some(b) = baselines.get(actor) else {
            return BaselineSnapshot::empty();
        };
        let m = b.decay_multiplier(at);
        let total = b.total_share_count * m;
        BaselineSnapshot {
            insufficient_history: total < MIN_HISTORY,
            seen_domain: destination_domain
                .map(|d| b.known_external_domains.contains(&d.to_ascii_lowercase()))
                .unwrap_or(false),
            external_share_frequency: b.external_share_count * m / 30.0,
            own_file_share_ratio: if b.total_share_count > 0.0 {
                b.own_share_count / b.total_share_count
            } else {
                0.0
            },
        }
    }

    /// Fold one processed exfil event into the actor's baseline. Called for
    /// every event, finding or not.
    pub fn observe_exfil(
        &self,
        event: &ExfilEvent,
        file_owner: Option<&str>,
        primary_domain: Option<&str>,
    ) {
        let at = event.timestamp;
        self.ensure_loaded(&event.actor, at);

        let mut baselines = self.baselines.write();
        let baseline = baselines
            .entry(event.actor.clone())
            .or_insert_with(|| UserBaseline::new(&event.actor, at));

        baseline.apply_decay(at);
        baseline.total_share_count += 1.0;

        let owner = file_owner.or(event.owner.as_deref());
        if owner.map(|o| o.eq_ignore_ascii_case(&event.actor)).unwrap_or(false) {
            baseline.own_share_count += 1.0;
        }

        if event.is_external_share(primary_domain) {
            baseline.external_share_count += 1.0;
        }
        if let Some(domain) = event.destination_domain() {
            let external = primary_domain
                .map(|p| !domain.eq_ignore_ascii_case(p))
                .unwrap_or(true);
            if external {
                baseline.known_external_domains.insert(domain);
            }
        }

        if let Some(kv) = &self.kv {
            match serde_json::to_string(&*baseline) {
                Ok(payload) => {
                    if let Err(err) = kv.set_raw(&Self::key(&event.actor), &payload) {
                        tracing::warn!("baseline persist failed for {}: {}", event.actor, err);
                    }
                }
                Err(err) => {
                    tracing::warn!("baseline encode failed for {}: {}", event.actor, err);
                }
            }
        }
    }
}
