//! End-to-end detection scenarios with the in-memory backend.

mod common;

use std::io::Write;

use common::{engine, exfil_event, recon_event, run_batch, visibility_exfil, ACTOR};
use itd_core::time::utc;
use itd_core::{ExfilKind, ReconAction, Severity};
use itd_detector::{DetectorConfig, MemoryAuditSource};

#[test]
fn s1_high_immediate() {
    let e = engine(DetectorConfig::default());
    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            utc(2025, 1, 15, 14, 18, 12),
        )],
        vec![visibility_exfil("e1", ACTOR, utc(2025, 1, 15, 14, 23, 45))],
    );

    assert_eq!(outcome.findings.len(), 1);
    let finding = &outcome.findings[0];
    assert_eq!(finding.severity, Severity::High);
    assert_eq!(finding.delta_minutes, Some(5.55));
    assert_eq!(finding.actor, ACTOR);
    assert_eq!(finding.exfil_event, "change_visibility");
    assert_eq!(finding.recon_action.as_deref(), Some("summarize_file"));
    assert_eq!(finding.event_ids.recon.as_deref(), Some("r1"));
    assert_eq!(finding.event_ids.exfil, "e1");
    assert_eq!(finding.visibility.as_deref(), Some("people_with_link"));
}

#[test]
fn s2_medium_immediate() {
    let e = engine(DetectorConfig::default());
    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            utc(2025, 1, 15, 14, 18, 12),
        )],
        vec![visibility_exfil("e1", ACTOR, utc(2025, 1, 15, 14, 33, 12))],
    );

    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].severity, Severity::Medium);
    assert_eq!(outcome.findings[0].delta_minutes, Some(15.0));
}

#[test]
fn s3_suppressed_by_allowlist() {
    let mut config = DetectorConfig::default();
    config.primary_domain = Some("x.com".to_string());
    config
        .suppressions
        .allowed_external_domains
        .push("partner.com".to_string());

    let e = engine(config);
    let mut share = exfil_event(
        "e1",
        ACTOR,
        ExfilKind::ChangeAcl,
        Some("D1"),
        utc(2025, 1, 15, 14, 23, 45),
    );
    share.destination_acl = Some("bob@partner.com".to_string());

    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            utc(2025, 1, 15, 14, 18, 12),
        )],
        vec![share],
    );

    assert!(outcome.findings.is_empty());
    assert_eq!(outcome.stats.suppressed, 1);
}

#[test]
fn s4_delayed_detection() {
    let e = engine(DetectorConfig::default());

    // Day D-1: a run-up of document analysis, no exfil.
    let recon: Vec<_> = (0..6)
        .map(|i| {
            recon_event(
                &format!("r{}", i),
                ACTOR,
                ReconAction::AnalyzeDocuments,
                None,
                utc(2025, 1, 14, 9, 10 * i, 0),
            )
        })
        .collect();
    let outcome = run_batch(&e, recon, vec![]);
    assert!(outcome.findings.is_empty());

    // Day D: an export with no recon anywhere near the window.
    let outcome = run_batch(
        &e,
        vec![],
        vec![exfil_event(
            "e1",
            ACTOR,
            ExfilKind::Export,
            Some("D9"),
            utc(2025, 1, 15, 9, 30, 0),
        )],
    );

    assert_eq!(outcome.findings.len(), 1);
    let finding = &outcome.findings[0];
    assert_eq!(finding.severity, Severity::Medium);
    assert_eq!(finding.recon_action, None);
    assert_eq!(finding.recon_time, None);
    assert_eq!(finding.delta_minutes, None);
    assert_eq!(finding.event_ids.recon, None);
    assert!(finding.reason.contains("delayed exfil after cumulative recon"));
    // Twelve points of recon decayed for roughly a day.
    assert!(finding.recon_score >= 5.0 && finding.recon_score < 12.0);
}

#[test]
fn s5_override_elevation() {
    let metadata = r#"{"D1": {"owner": "u@x.com", "labels": ["confidential"], "shared_externally": false}}"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", metadata).unwrap();

    let mut config = DetectorConfig::default();
    config.file_metadata_path = Some(file.path().to_path_buf());
    config
        .severity_overrides
        .sensitive_labels
        .push("confidential".to_string());
    config
        .severity_overrides
        .high_risk_ous
        .push("/Executives".to_string());
    config
        .org_units
        .insert(ACTOR.to_string(), "/Executives".to_string());

    let e = engine(config);
    // The S2 shape: medium base at a 15 minute delta.
    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            utc(2025, 1, 15, 14, 18, 12),
        )],
        vec![visibility_exfil("e1", ACTOR, utc(2025, 1, 15, 14, 33, 12))],
    );

    assert_eq!(outcome.findings.len(), 1);
    let finding = &outcome.findings[0];
    assert_eq!(finding.severity, Severity::High);
    assert!(finding.reason.contains("(high-sensitivity file)"));
    assert!(finding.reason.contains("(high-risk org unit)"));
    assert_eq!(finding.file_context.labels, vec!["confidential"]);
}

#[test]
fn high_risk_folder_elevates_severity() {
    let metadata =
        r#"{"D1": {"owner": "u@x.com", "labels": [], "shared_externally": false, "parent_folder": "F-exec"}}"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", metadata).unwrap();

    let mut config = DetectorConfig::default();
    config.file_metadata_path = Some(file.path().to_path_buf());
    config.high_risk_folders.push("F-exec".to_string());

    let e = engine(config);
    // Medium base at a 15 minute delta steps to high on the folder.
    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            utc(2025, 1, 15, 14, 18, 12),
        )],
        vec![visibility_exfil("e1", ACTOR, utc(2025, 1, 15, 14, 33, 12))],
    );

    assert_eq!(outcome.findings.len(), 1);
    let finding = &outcome.findings[0];
    assert_eq!(finding.severity, Severity::High);
    assert!(finding.reason.contains("(high-risk folder)"));
}

#[test]
fn s6_duplicate_events_yield_one_finding() {
    let e = engine(DetectorConfig::default());
    let exfil = visibility_exfil("e1", ACTOR, utc(2025, 1, 15, 14, 23, 45));
    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            utc(2025, 1, 15, 14, 18, 12),
        )],
        vec![exfil.clone(), exfil],
    );

    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.stats.duplicates_dropped, 1);
}

#[test]
fn zero_delta_renders_as_zero() {
    let e = engine(DetectorConfig::default());
    let ts = utc(2025, 1, 15, 14, 18, 12);
    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            ts,
        )],
        vec![visibility_exfil("e1", ACTOR, ts)],
    );

    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].delta_minutes, Some(0.0));
}

#[test]
fn window_boundary_is_inclusive() {
    let e = engine(DetectorConfig::default());
    let recon_ts = utc(2025, 1, 15, 14, 0, 0);

    // Exactly at recon + window.
    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            recon_ts,
        )],
        vec![visibility_exfil("e1", ACTOR, utc(2025, 1, 15, 14, 30, 0))],
    );
    assert_eq!(outcome.findings.len(), 1);

    // One second past the window, and no persistent score to fall back on.
    let e = engine(DetectorConfig::default());
    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            recon_ts,
        )],
        vec![visibility_exfil("e1", ACTOR, utc(2025, 1, 15, 14, 30, 1))],
    );
    assert!(outcome.findings.is_empty());
}

#[test]
fn revert_pattern_scores_high() {
    let e = engine(DetectorConfig::default());
    let mut back = visibility_exfil("e2", ACTOR, utc(2025, 1, 15, 14, 28, 0));
    back.visibility = Some(itd_core::Visibility::Private);

    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            utc(2025, 1, 15, 14, 18, 12),
        )],
        vec![
            visibility_exfil("e1", ACTOR, utc(2025, 1, 15, 14, 23, 45)),
            back,
        ],
    );

    assert_eq!(outcome.findings.len(), 2);
    assert!(outcome
        .findings
        .iter()
        .all(|f| f.severity == Severity::High));
    assert!(outcome.findings[0].reason.contains("rapid revert"));
}

#[test]
fn canary_document_forces_high() {
    let mut config = DetectorConfig::default();
    config.canary_doc_ids.push("D1".to_string());
    let e = engine(config);

    // Copy at a 25 minute delta would otherwise be low.
    let outcome = run_batch(
        &e,
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            utc(2025, 1, 15, 14, 0, 0),
        )],
        vec![exfil_event(
            "e1",
            ACTOR,
            ExfilKind::Copy,
            Some("D1"),
            utc(2025, 1, 15, 14, 25, 0),
        )],
    );

    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].severity, Severity::High);
    assert!(outcome.findings[0].reason.contains("canary document access"));
}

#[test]
fn future_timestamps_are_clamped() {
    let e = engine(DetectorConfig::default());
    let source = MemoryAuditSource::new(
        vec![recon_event(
            "r1",
            ACTOR,
            ReconAction::SummarizeFile,
            Some("D1"),
            utc(2025, 1, 30, 23, 59, 0),
        )],
        // An hour past `now`: clamped back to now, landing inside the window.
        vec![visibility_exfil("e1", ACTOR, utc(2025, 1, 31, 1, 0, 0))],
    );
    let outcome = e
        .run(
            &source,
            utc(2025, 1, 1, 0, 0, 0),
            utc(2025, 1, 31, 2, 0, 0),
            utc(2025, 1, 31, 0, 0, 0),
        )
        .unwrap();
    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].exfil_time, "2025-01-31T00:00:00+00:00");
}
