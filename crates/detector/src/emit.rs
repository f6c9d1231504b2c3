//! Finding rendering and emission.
//!
//! Renders candidates into the stable output record, ranks them (high
//! severity first, then exfil time) and writes the findings file. The file
//! is written even when empty; a write failure is retried once and then
//! dumped to a sibling error file before the run exits with code 3.

use std::path::PathBuf;

use chrono_tz::Tz;

use itd_core::time::render_local;
use itd_core::{trunc2, DetectorError, EventIds, Finding, IntentAnalysis, Severity};

use crate::correlate::Candidate;
use crate::file_context::FileContext;

/// Build the output record for an accepted candidate.
pub fn render_finding(
    candidate: &Candidate,
    severity: Severity,
    reason: String,
    intent: IntentAnalysis,
    file_context: &FileContext,
    tz: &Tz,
) -> Finding {
    let exfil = &candidate.exfil;
    Finding {
        severity,
        actor: exfil.actor.clone(),
        exfil_event: exfil.event_type.as_str().to_string(),
        exfil_time: render_local(exfil.timestamp, tz),
        doc_id: exfil.doc_id.clone(),
        doc_title: exfil.doc_title.clone(),
        recon_action: candidate
            .recon
            .as_ref()
            .map(|r| r.action.as_str().to_string()),
        recon_time: candidate
            .recon
            .as_ref()
            .map(|r| render_local(r.timestamp, tz)),
        delta_minutes: candidate.delta_minutes.map(trunc2),
        visibility: exfil.visibility.map(|v| v.as_str().to_string()),
        reason,
        event_ids: EventIds {
            recon: candidate.recon.as_ref().map(|r| r.event_id.clone()),
            exfil: exfil.event_id.clone(),
        },
        recon_score: trunc2(candidate.recon_score),
        file_context: file_context.to_info(),
        intent_analysis: intent,
    }
}

/// Rank for output: severity first, then exfil time, then exfil event id as
/// a deterministic tiebreak.
pub fn rank_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        (a.severity.rank(), &a.exfil_time, &a.event_ids.exfil)
            .cmp(&(b.severity.rank(), &b.exfil_time, &b.event_ids.exfil))
    });
}

/// Findings file writer. Without an output path, findings go to stdout.
pub struct FindingWriter {
    output: Option<PathBuf>,
}

impl FindingWriter {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output }
    }

    pub fn write(&self, findings: &[Finding]) -> Result<(), DetectorError> {
        let payload = serde_json::to_string_pretty(findings)
            .map_err(|e| DetectorError::Internal(format!("finding encode: {}", e)))?;

        let Some(path) = &self.output else {
            println!("{}", payload);
            return Ok(());
        };

        let mut last_error = None;
        for attempt in 0..2 {
            match std::fs::write(path, &payload) {
                Ok(()) => {
                    tracing::info!("findings written to {}", path.display());
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(
                        "findings write failed (attempt {}): {}",
                        attempt + 1,
                        err
                    );
                    last_error = Some(err);
                }
            }
        }

        let fallback = path.with_extension("err.json");
        let dumped = std::fs::write(&fallback, &payload).is_ok();
        Err(DetectorError::Emission(format!(
            "failed to write {} ({}){}",
            path.display(),
            last_error.map(|e| e.to_string()).unwrap_or_default(),
            if dumped {
                format!("; findings dumped to {}", fallback.display())
            } else {
                "; fallback dump also failed".to_string()
            }
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itd_core::time::utc;
    use itd_core::{ExfilEvent, ExfilKind, Intent, ReconAction, ReconApp, ReconEvent, Visibility};

    fn candidate() -> Candidate {
        Candidate {
            exfil: ExfilEvent {
                event_id: "e1".to_string(),
                actor: "u@x.com".to_string(),
                event_type: ExfilKind::ChangeVisibility,
                doc_id: Some("D1".to_string()),
                doc_title: Some("Q4 Plan".to_string()),
                visibility: Some(Visibility::PeopleWithLink),
                new_value: None,
                old_value: None,
                destination_acl: None,
                destination_folder_id: None,
                owner: None,
                timestamp: utc(2025, 1, 15, 14, 23, 45),
                is_revert: false,
            },
            recon: Some(ReconEvent {
                event_id: "r1".to_string(),
                actor: "u@x.com".to_string(),
                action: ReconAction::SummarizeFile,
                app: ReconApp::Docs,
                doc_id: Some("D1".to_string()),
                timestamp: utc(2025, 1, 15, 14, 18, 12),
            }),
            delta_minutes: Some(333.0 / 60.0),
            recon_score: 1.9984,
            bursty: false,
        }
    }

    fn intent() -> IntentAnalysis {
        IntentAnalysis {
            intent: Intent::Suspicious,
            confidence: 0.0,
            reasons: Vec::new(),
            should_suppress: false,
            destination_domain: None,
        }
    }

    #[test]
    fn test_render_truncates_fractions() {
        let tz: Tz = "UTC".parse().unwrap();
        let ctx = FileContext::unknown("D1", utc(2025, 1, 15, 14, 0, 0));
        let finding = render_finding(
            &candidate(),
            Severity::High,
            "external share within 10min of recon".to_string(),
            intent(),
            &ctx,
            &tz,
        );
        assert_eq!(finding.delta_minutes, Some(5.55));
        assert_eq!(finding.recon_score, 1.99);
        assert_eq!(finding.exfil_time, "2025-01-15T14:23:45+00:00");
        assert_eq!(finding.recon_action.as_deref(), Some("summarize_file"));
        assert_eq!(finding.event_ids.recon.as_deref(), Some("r1"));
    }

    #[test]
    fn test_rank_orders_by_severity_then_time() {
        let tz: Tz = "UTC".parse().unwrap();
        let ctx = FileContext::unknown("D1", utc(2025, 1, 15, 14, 0, 0));
        let mut low = render_finding(&candidate(), Severity::Low, "r".to_string(), intent(), &ctx, &tz);
        low.exfil_time = "2025-01-15T10:00:00+00:00".to_string();
        let high = render_finding(&candidate(), Severity::High, "r".to_string(), intent(), &ctx, &tz);
        let mut medium_late = render_finding(&candidate(), Severity::Medium, "r".to_string(), intent(), &ctx, &tz);
        medium_late.exfil_time = "2025-01-15T18:00:00+00:00".to_string();
        let medium_early = render_finding(&candidate(), Severity::Medium, "r".to_string(), intent(), &ctx, &tz);

        let mut findings = vec![low, medium_late.clone(), high.clone(), medium_early.clone()];
        rank_findings(&mut findings);

        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[1].exfil_time, medium_early.exfil_time);
        assert_eq!(findings[2].exfil_time, medium_late.exfil_time);
        assert_eq!(findings[3].severity, Severity::Low);
    }

    #[test]
    fn test_writer_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.json");
        let writer = FindingWriter::new(Some(path.clone()));
        writer.write(&[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[test]
    fn test_writer_failure_dumps_to_sibling() {
        let dir = tempfile::tempdir().unwrap();
        // Point the writer at a directory path so the write fails.
        let path = dir.path().join("missing").join("findings.json");
        let writer = FindingWriter::new(Some(path));
        let err = writer.write(&[]).unwrap_err();
        assert!(matches!(err, DetectorError::Emission(_)));
    }
}
