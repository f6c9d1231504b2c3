//! The detection engine.
//!
//! Owns every component explicitly (no global state) and drives one batch
//! per invocation: fetch, validate, dedup, clamp, group by actor, then
//! correlate each actor on a bounded worker pool. Per-actor work is
//! sequential so recon ingestion precedes exfil correlation; cross-actor
//! work runs in parallel. Cancellation is cooperative and partial findings
//! survive it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

use itd_core::{DetectorError, ExfilEvent, Finding, ReconEvent, Severity};

use crate::adapters::AuditSource;
use crate::baseline::UserBaselineTracker;
use crate::burst::is_burst;
use crate::config::{DetectorConfig, ReconStateBackendConfig};
use crate::correlate::{
    clamp_event_times, dedup_events, group_by_actor, mark_reverts, match_immediate, Candidate,
};
use crate::directory::{DirectoryResolver, StaticDirectory};
use crate::emit::{rank_findings, render_finding};
use crate::file_context::{
    FileContext, FileContextProvider, FileMetadataSource, NullFileMetadataSource,
    StaticFileMetadataSource,
};
use crate::intent::IntentClassifier;
use crate::kv::RedisKv;
use crate::recon::{MemoryReconBackend, ReconStateBackend, ReconTracker, RedisReconBackend};
use crate::severity::{Resolution, SeverityResolver};
use crate::util::CancelToken;

/// Hard cap on the worker pool.
const MAX_WORKERS: usize = 8;

#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub recon_events: usize,
    pub exfil_events: usize,
    pub malformed_skipped: usize,
    pub duplicates_dropped: usize,
    pub suppressed: usize,
    pub findings: usize,
    pub high_findings: usize,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub findings: Vec<Finding>,
    pub stats: RunStats,
}

pub struct Engine {
    config: DetectorConfig,
    tz: Tz,
    recon: ReconTracker,
    baselines: UserBaselineTracker,
    files: FileContextProvider,
    intent: IntentClassifier,
    severity: SeverityResolver,
    cancel: CancelToken,
}

impl Engine {
    pub fn from_config(config: DetectorConfig, cancel: CancelToken) -> Result<Self, DetectorError> {
        let tz = config.validate()?;

        let kv = match &config.recon_state_backend {
            ReconStateBackendConfig::Kv { url } => Some(RedisKv::open(url)?),
            ReconStateBackendConfig::Memory => None,
        };
        let backend: Arc<dyn ReconStateBackend> = match &kv {
            Some(kv) => Arc::new(RedisReconBackend::new(
                kv.clone(),
                config.recon_half_life_hours,
            )),
            None => Arc::new(MemoryReconBackend::new(config.recon_half_life_hours)),
        };
        let recon = ReconTracker::new(backend, config.recon_half_life_hours);
        let baselines = UserBaselineTracker::new(kv);

        let directory: Arc<dyn DirectoryResolver> =
            Arc::new(StaticDirectory::new(config.org_units.clone()));

        let metadata_source: Arc<dyn FileMetadataSource> = match &config.file_metadata_path {
            Some(path) => Arc::new(StaticFileMetadataSource::from_json_file(path)?),
            None => Arc::new(NullFileMetadataSource),
        };
        let files = FileContextProvider::new(
            metadata_source,
            directory.clone(),
            &config.severity_overrides.sensitive_labels,
            &config.severity_overrides.high_risk_ous,
        );

        let intent = IntentClassifier::new(
            &config.suppressions.allowed_external_domains,
            &config.partner_domains,
            config.intent.malicious_threshold,
            config.intent.suspicious_threshold,
            tz,
        );
        let severity = SeverityResolver::new(
            &config.severity_overrides.high_risk_ous,
            &config.high_risk_folders,
            &config.suppressions.exclude_actors,
            &config.suppressions.security_investigation_ous,
            &config.canary_doc_ids,
            config.primary_domain.clone(),
            directory,
        );

        Ok(Self {
            config,
            tz,
            recon,
            baselines,
            files,
            intent,
            severity,
            cancel,
        })
    }

    /// Process one batch window. `now` anchors clock-skew clamping and is
    /// injected so replays are deterministic.
    pub fn run(
        &self,
        source: &dyn AuditSource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, DetectorError> {
        let mut stats = RunStats::default();

        let recon_raw = source.fetch_recon(start, end)?;
        let exfil_raw = source.fetch_exfil(start, end)?;
        tracing::info!(
            "fetched {} recon and {} exfil events",
            recon_raw.len(),
            exfil_raw.len()
        );

        let recon_valid: Vec<ReconEvent> = recon_raw
            .into_iter()
            .filter(|e| match e.validate() {
                Ok(()) => true,
                Err(field) => {
                    stats.malformed_skipped += 1;
                    tracing::info!("skipping recon event with invalid {}", field);
                    false
                }
            })
            .collect();
        let exfil_valid: Vec<ExfilEvent> = exfil_raw
            .into_iter()
            .filter(|e| match e.validate() {
                Ok(()) => true,
                Err(field) => {
                    stats.malformed_skipped += 1;
                    tracing::info!("skipping exfil event with invalid {}", field);
                    false
                }
            })
            .collect();

        let (mut recon, mut exfil, duplicates) = dedup_events(recon_valid, exfil_valid);
        stats.duplicates_dropped = duplicates;
        stats.recon_events = recon.len();
        stats.exfil_events = exfil.len();

        clamp_event_times(
            &mut recon,
            &mut exfil,
            now,
            Duration::minutes(self.config.skew_tolerance_minutes),
        );
        mark_reverts(&mut exfil);

        let groups = group_by_actor(recon, exfil);
        let queue: Mutex<VecDeque<(String, Vec<ReconEvent>, Vec<ExfilEvent>)>> = Mutex::new(
            groups
                .into_iter()
                .map(|(actor, (recons, exfils))| (actor, recons, exfils))
                .collect(),
        );
        let results: Mutex<BTreeMap<String, (Vec<Finding>, usize)>> = Mutex::new(BTreeMap::new());

        let workers = self.worker_count(queue.lock().len());
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let Some((actor, recons, exfils)) = queue.lock().pop_front() else {
                        break;
                    };
                    let output = self.process_actor(&actor, &recons, &exfils);
                    results.lock().insert(actor, output);
                });
            }
        });

        if self.cancel.is_cancelled() {
            tracing::warn!("run cancelled; emitting partial findings");
        }

        let mut findings = Vec::new();
        for (_, (actor_findings, suppressed)) in results.into_inner() {
            stats.suppressed += suppressed;
            findings.extend(actor_findings);
        }
        rank_findings(&mut findings);

        stats.findings = findings.len();
        stats.high_findings = findings
            .iter()
            .filter(|f| f.severity == Severity::High)
            .count();
        tracing::info!(
            "correlation complete: {} findings ({} high), {} suppressed, {} duplicates, {} malformed",
            stats.findings,
            stats.high_findings,
            stats.suppressed,
            stats.duplicates_dropped,
            stats.malformed_skipped
        );

        Ok(RunOutcome { findings, stats })
    }

    fn worker_count(&self, actors: usize) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let bound = self
            .config
            .max_workers
            .unwrap_or_else(|| available.min(MAX_WORKERS));
        bound.clamp(1, MAX_WORKERS.max(1)).min(actors.max(1))
    }

    /// One actor's batch: recon ingestion first, then exfil correlation in
    /// timestamp order. Returns findings plus the suppressed count.
    fn process_actor(
        &self,
        actor: &str,
        recons: &[ReconEvent],
        exfils: &[ExfilEvent],
    ) -> (Vec<Finding>, usize) {
        for recon in recons {
            self.recon.observe_recon(actor, recon.action, recon.timestamp);
        }

        let recon_times: Vec<DateTime<Utc>> = recons.iter().map(|r| r.timestamp).collect();
        let bursty = is_burst(&recon_times, self.config.burst_threshold);

        let mut findings = Vec::new();
        let mut suppressed = 0usize;

        for exfil in exfils {
            if self.cancel.is_cancelled() {
                break;
            }

            let recon_score = self.recon.current_score(actor, exfil.timestamp);
            let candidate = match match_immediate(recons, exfil, self.config.window_minutes) {
                Some(recon) => {
                    let delta_seconds = (exfil.timestamp - recon.timestamp).num_seconds();
                    Some(Candidate {
                        exfil: exfil.clone(),
                        recon: Some(recon.clone()),
                        delta_minutes: Some(delta_seconds as f64 / 60.0),
                        recon_score,
                        bursty,
                    })
                }
                None if recon_score >= self.config.delayed_threshold => {
                    tracing::info!(
                        "delayed exfil detected for {} (recon_score={:.2})",
                        actor,
                        recon_score
                    );
                    Some(Candidate {
                        exfil: exfil.clone(),
                        recon: None,
                        delta_minutes: None,
                        recon_score,
                        bursty,
                    })
                }
                None => None,
            };

            let mut context_owner: Option<String> = None;
            if let Some(candidate) = candidate {
                let context = match &candidate.exfil.doc_id {
                    Some(doc_id) => self.files.get(doc_id, candidate.exfil.timestamp),
                    None => FileContext::unknown("", candidate.exfil.timestamp),
                };
                context_owner = context.owner.clone();

                let snapshot = self.baselines.snapshot(
                    actor,
                    candidate.exfil.destination_domain().as_deref(),
                    candidate.exfil.timestamp,
                );
                let analysis =
                    self.intent
                        .classify(&candidate.exfil, &context, recon_score, &snapshot);

                match self.severity.resolve(&candidate, &analysis, &context) {
                    Resolution::Emit { severity, reason } => {
                        findings.push(render_finding(
                            &candidate, severity, reason, analysis, &context, &self.tz,
                        ));
                    }
                    Resolution::Drop { why } => {
                        suppressed += 1;
                        tracing::debug!("dropping candidate: {}", why);
                    }
                }
            }

            // Baselines learn from every processed exfil, finding or not.
            self.baselines.observe_exfil(
                exfil,
                context_owner.as_deref(),
                self.config.primary_domain.as_deref(),
            );
        }

        (findings, suppressed)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}
