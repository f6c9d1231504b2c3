//! Temporal join between recon and exfil streams.
//!
//! Pure batch-shaping pieces live here: dedup, clock-skew clamping, revert
//! marking, per-actor grouping and the immediate-match selection rule. The
//! engine drives these per actor and hands the resulting candidates to the
//! intent classifier and severity resolver.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use itd_core::time::clamp_future;
use itd_core::{ExfilEvent, ExfilKind, ReconEvent};

/// A matched exfil awaiting classification. `recon` and `delta_minutes` are
/// both present for immediate matches and both absent for delayed ones.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub exfil: ExfilEvent,
    pub recon: Option<ReconEvent>,
    pub delta_minutes: Option<f64>,
    pub recon_score: f64,
    pub bursty: bool,
}

/// Drop events whose `(event_id, kind)` was already seen. Adapter retries
/// can replay events; the first occurrence wins.
pub fn dedup_events(
    recon: Vec<ReconEvent>,
    exfil: Vec<ExfilEvent>,
) -> (Vec<ReconEvent>, Vec<ExfilEvent>, usize) {
    let mut seen: HashSet<(String, &'static str)> = HashSet::new();
    let mut dropped = 0usize;

    let recon = recon
        .into_iter()
        .filter(|e| {
            if seen.insert((e.event_id.clone(), "recon")) {
                true
            } else {
                dropped += 1;
                false
            }
        })
        .collect();
    let exfil = exfil
        .into_iter()
        .filter(|e| {
            if seen.insert((e.event_id.clone(), "exfil")) {
                true
            } else {
                dropped += 1;
                false
            }
        })
        .collect();

    (recon, exfil, dropped)
}

/// Clamp timestamps sitting further than `tolerance` in the future to `now`.
pub fn clamp_event_times(
    recon: &mut [ReconEvent],
    exfil: &mut [ExfilEvent],
    now: DateTime<Utc>,
    tolerance: Duration,
) {
    for event in recon.iter_mut() {
        event.timestamp = clamp_future(event.timestamp, now, tolerance);
    }
    for event in exfil.iter_mut() {
        event.timestamp = clamp_future(event.timestamp, now, tolerance);
    }
}

/// Mark external-toggle-then-revert pairs: a visibility change to an
/// external state followed within ten minutes by a change back on the same
/// document flags both events.
pub fn mark_reverts(events: &mut [ExfilEvent]) {
    let mut by_doc: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, event) in events.iter().enumerate() {
        if event.event_type == ExfilKind::ChangeVisibility && event.visibility.is_some() {
            if let Some(doc_id) = &event.doc_id {
                by_doc.entry(doc_id.clone()).or_default().push(idx);
            }
        }
    }

    let mut marks = vec![false; events.len()];
    for indexes in by_doc.values_mut() {
        indexes.sort_by(|&a, &b| {
            (events[a].timestamp, &events[a].event_id)
                .cmp(&(events[b].timestamp, &events[b].event_id))
        });
        for pair in indexes.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            let delta = events[next].timestamp - events[current].timestamp;
            if delta > Duration::minutes(10) {
                continue;
            }
            let went_external = events[current]
                .visibility
                .map(|v| v.is_external())
                .unwrap_or(false);
            let came_back = events[next]
                .visibility
                .map(|v| !v.is_external())
                .unwrap_or(false);
            if went_external && came_back {
                marks[current] = true;
                marks[next] = true;
            }
        }
    }
    for (idx, marked) in marks.iter().enumerate() {
        if *marked {
            events[idx].is_revert = true;
        }
    }
}

/// Group both streams by actor, each group sorted by `(timestamp,
/// event_id)`. The map is ordered so downstream scheduling is
/// deterministic.
pub fn group_by_actor(
    recon: Vec<ReconEvent>,
    exfil: Vec<ExfilEvent>,
) -> BTreeMap<String, (Vec<ReconEvent>, Vec<ExfilEvent>)> {
    let mut groups: BTreeMap<String, (Vec<ReconEvent>, Vec<ExfilEvent>)> = BTreeMap::new();
    for event in recon {
        groups.entry(event.actor.clone()).or_default().0.push(event);
    }
    for event in exfil {
        groups.entry(event.actor.clone()).or_default().1.push(event);
    }
    for (recons, exfils) in groups.values_mut() {
        recons.sort_by(|a, b| (a.timestamp, &a.event_id).cmp(&(b.timestamp, &b.event_id)));
        exfils.sort_by(|a, b| (a.timestamp, &a.event_id).cmp(&(b.timestamp, &b.event_id)));
    }
    groups
}

/// Select the recon event backing an immediate match, if any.
///
/// Eligible recons lie within `[0, window]` before the exfil and either
/// reference the same document or are file-agnostic. Same-document matches
/// win over agnostic ones; ties go to the most recent.
pub fn match_immediate<'a>(
    recons: &'a [ReconEvent],
    exfil: &ExfilEvent,
    window_minutes: i64,
) -> Option<&'a ReconEvent> {
    let window_seconds = window_minutes * 60;
    let mut best_same_doc: Option<&ReconEvent> = None;
    let mut best_agnostic: Option<&ReconEvent> = None;

    for recon in recons {
        let delta = (exfil.timestamp - recon.timestamp).num_seconds();
        if delta < 0 {
            // Sorted ascending; everything later is in the future too.
            break;
        }
        if delta > window_seconds {
            continue;
        }
        match (&recon.doc_id, &exfil.doc_id) {
            (Some(recon_doc), Some(exfil_doc)) if recon_doc == exfil_doc => {
                best_same_doc = Some(recon);
            }
            (Some(_), Some(_)) => {}
            _ => best_agnostic = Some(recon),
        }
    }

    best_same_doc.or(best_agnostic)
}
