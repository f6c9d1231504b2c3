//! Severity assignment: base rubric, overrides, suppression.
//!
//! Base severity comes from the recon-to-exfil delta and the exfil channel.
//! Override conditions (sensitive file, high-risk org unit, high-risk
//! folder) then step it up, and suppression/exclusion rules decide whether
//! the finding is emitted at all. A finding that reached `high` through an
//! override or a canary document survives suppression.

use std::collections::HashSet;
use std::sync::Arc;

use itd_core::{ExfilKind, IntentAnalysis, Sensitivity, Severity};

use crate::correlate::Candidate;
use crate::directory::DirectoryResolver;
use crate::file_context::FileContext;

/// Outcome of severity resolution for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Emit { severity: Severity, reason: String },
    Drop { why: String },
}

pub struct SeverityResolver {
    high_risk_ous: Vec<String>,
    high_risk_folders: HashSet<String>,
    exclude_actors: HashSet<String>,
    security_investigation_ous: Vec<String>,
    canary_doc_ids: HashSet<String>,
    primary_domain: Option<String>,
    directory: Arc<dyn DirectoryResolver>,
}

impl SeverityResolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        high_risk_ous: &[String],
        high_risk_folders: &[String],
        exclude_actors: &[String],
        security_investigation_ous: &[String],
        canary_doc_ids: &[String],
        primary_domain: Option<String>,
        directory: Arc<dyn DirectoryResolver>,
    ) -> Self {
        Self {
            high_risk_ous: high_risk_ous.to_vec(),
            high_risk_folders: high_risk_folders.iter().cloned().collect(),
            exclude_actors: exclude_actors
                .iter()
                .map(|a| a.to_ascii_lowercase())
                .collect(),
            security_investigation_ous: security_investigation_ous.to_vec(),
            canary_doc_ids: canary_doc_ids.iter().cloned().collect(),
            primary_domain,
            directory,
        }
    }

    pub fn resolve(
        &self,
        candidate: &Candidate,
        intent: &IntentAnalysis,
        file_context: &FileContext,
    ) -> Resolution {
        let exfil = &candidate.exfil;
        let actor_ou = self.directory.org_unit(&exfil.actor);

        if self.exclude_actors.contains(&exfil.actor.to_ascii_lowercase()) {
            return Resolution::Drop {
                why: format!("excluded actor {}", exfil.actor),
            };
        }
        if let Some(ou) = &actor_ou {
            if self.security_investigation_ous.contains(ou) {
                return Resolution::Drop {
                    why: format!("security investigation OU {}", ou),
                };
            }
        }

        let primary = self.primary_domain.as_deref();
        let (mut severity, mut reason) = self.base_severity(candidate, primary);

        let canary = exfil
            .doc_id
            .as_deref()
            .map(|d| self.canary_doc_ids.contains(d))
            .unwrap_or(false);
        if canary {
            severity = Severity::High;
            reason = format!("canary document access; {}", reason);
        }

        let mut indicators = 0u8;
        if file_context.sensitivity == Sensitivity::High {
            indicators += 1;
            reason.push_str(" (high-sensitivity file)");
        }
        if let Some(ou) = &actor_ou {
            if self.high_risk_ous.contains(ou) {
                indicators += 1;
                reason.push_str(" (high-risk org unit)");
            }
        }
        // The document's parent comes from file metadata; an add_to_folder
        // destination is the new parent and takes precedence.
        let parent_folder = exfil
            .destination_folder_id
            .as_deref()
            .or(file_context.parent_folder.as_deref());
        if let Some(folder) = parent_folder {
            if self.high_risk_folders.contains(folder) {
                indicators += 1;
                reason.push_str(" (high-risk folder)");
            }
        }
        let steps = match indicators {
            0 => 0,
            1 => 1,
            _ => 2,
        };
        severity = severity.step_up(steps);

        if candidate.bursty {
            reason.push_str("; rapid recon burst preceding exfil");
        }

        if intent.should_suppress {
            let override_protected = severity == Severity::High && (indicators > 0 || canary);
            if !override_protected {
                return Resolution::Drop {
                    why: format!("suppressed by intent for {}", exfil.actor),
                };
            }
        }

        Resolution::Emit { severity, reason }
    }

    fn base_severity(&self, candidate: &Candidate, primary: Option<&str>) -> (Severity, String) {
        let exfil = &candidate.exfil;

        if exfil.is_revert {
            return (
                Severity::High,
                "external visibility toggle with rapid revert (evasion pattern)".to_string(),
            );
        }

        match candidate.delta_minutes {
            None => {
                let severity = if exfil.is_external_share(primary)
                    || exfil.event_type == ExfilKind::Export
                {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                (
                    severity,
                    format!(
                        "delayed exfil after cumulative recon (score={:.2})",
                        candidate.recon_score
                    ),
                )
            }
            Some(delta) if delta <= 10.0 && exfil.is_high_risk_channel(primary) => {
                let reason = if exfil.is_external_share(primary) {
                    "external share within 10min of recon"
                } else {
                    "export/download within 10min of recon"
                };
                (Severity::High, reason.to_string())
            }
            Some(delta) if delta <= 30.0 && exfil.is_high_risk_channel(primary) => (
                Severity::Medium,
                "suspicious activity within 30min of recon".to_string(),
            ),
            Some(_) => (
                Severity::Low,
                "activity correlation detected".to_string(),
            ),
        }
    }
}
