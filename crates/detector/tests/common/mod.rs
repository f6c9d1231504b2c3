//! Shared fixtures for integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Utc};

use itd_core::time::utc;
use itd_core::{ExfilEvent, ExfilKind, ReconAction, ReconApp, ReconEvent, Visibility};
use itd_detector::engine::RunOutcome;
use itd_detector::{CancelToken, DetectorConfig, Engine, MemoryAuditSource};

pub const ACTOR: &str = "u@x.com";

pub fn recon_event(
    id: &str,
    actor: &str,
    action: ReconAction,
    doc_id: Option<&str>,
    timestamp: DateTime<Utc>,
) -> ReconEvent {
    ReconEvent {
        event_id: id.to_string(),
        actor: actor.to_string(),
        action,
        app: ReconApp::Docs,
        doc_id: doc_id.map(|d| d.to_string()),
        timestamp,
    }
}

pub fn exfil_event(
    id: &str,
    actor: &str,
    kind: ExfilKind,
    doc_id: Option<&str>,
    timestamp: DateTime<Utc>,
) -> ExfilEvent {
    ExfilEvent {
        event_id: id.to_string(),
        actor: actor.to_string(),
        event_type: kind,
        doc_id: doc_id.map(|d| d.to_string()),
        doc_title: None,
        visibility: None,
        new_value: None,
        old_value: None,
        destination_acl: None,
        destination_folder_id: None,
        owner: Some(actor.to_string()),
        timestamp,
        is_revert: false,
    }
}

/// The S1 external visibility change on D1.
pub fn visibility_exfil(id: &str, actor: &str, timestamp: DateTime<Utc>) -> ExfilEvent {
    let mut event = exfil_event(id, actor, ExfilKind::ChangeVisibility, Some("D1"), timestamp);
    event.visibility = Some(Visibility::PeopleWithLink);
    event
}

pub fn engine(config: DetectorConfig) -> Engine {
    Engine::from_config(config, CancelToken::new()).expect("engine construction")
}

/// Run a batch over the fixed test window around 2025-01-15.
pub fn run_batch(engine: &Engine, recon: Vec<ReconEvent>, exfil: Vec<ExfilEvent>) -> RunOutcome {
    let source = MemoryAuditSource::new(recon, exfil);
    engine
        .run(
            &source,
            utc(2025, 1, 1, 0, 0, 0),
            utc(2025, 1, 31, 0, 0, 0),
            utc(2025, 1, 31, 0, 0, 0),
        )
        .expect("engine run")
}
