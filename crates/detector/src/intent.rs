//! Rule-based intent classification.
//!
//! Distinguishes malicious exfil from routine collaboration using
//! destination reputation, the actor's baseline, ownership and time of day.
//! All signals are additive weights on a single score; the mapping to a
//! verdict is the only branching. Deterministic and pure given its inputs.

use std::collections::HashSet;

use chrono_tz::Tz;

use itd_core::time::is_off_hours;
use itd_core::{trunc2, ExfilEvent, Intent, IntentAnalysis, Sensitivity};

use crate::baseline::BaselineSnapshot;
use crate::file_context::FileContext;

/// External share frequency above which an actor counts as a routine sharer.
const ROUTINE_SHARES_PER_DAY: f64 = 3.0;

/// When ownership of the file is unknown, an actor whose sharing history is
/// mostly other people's files trips the ownership signal via their baseline.
const OWN_SHARE_RATIO_FLOOR: f64 = 0.5;

pub struct IntentClassifier {
    allowed_domains: HashSet<String>,
    partner_domains: HashSet<String>,
    malicious_threshold: f64,
    suspicious_threshold: f64,
    tz: Tz,
}

impl IntentClassifier {
    pub fn new(
        allowed_domains: &[String],
        partner_domains: &[String],
        malicious_threshold: f64,
        suspicious_threshold: f64,
        tz: Tz,
    ) -> Self {
        Self {
            allowed_domains: allowed_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            partner_domains: partner_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            malicious_threshold,
            suspicious_threshold,
            tz,
        }
    }

    pub fn classify(
        &self,
        exfil: &ExfilEvent,
        file_context: &FileContext,
        recon_score: f64,
        baseline: &BaselineSnapshot,
    ) -> IntentAnalysis {
        let mut score = 0.5_f64;
        let mut reasons: Vec<String> = Vec::new();

        let destination = exfil.destination_domain();
        let allowed = destination
            .as_deref()
            .map(|d| self.allowed_domains.contains(d))
            .unwrap_or(false);
        let partner = destination
            .as_deref()
            .map(|d| self.partner_domains.contains(d))
            .unwrap_or(false);

        // With insufficient history every destination counts as unseen.
        let seen_before = !baseline.insufficient_history && baseline.seen_domain;

        if let Some(domain) = destination.as_deref() {
            if allowed {
                score -= 0.35;
                reasons.push("trusted partner domain".to_string());
            } else if partner {
                score -= 0.15;
                reasons.push("known partner domain".to_string());
            } else if !seen_before {
                score += 0.20;
                reasons.push(format!("first-time share with {}", domain));
            }
        }

        let owner = file_context.owner.as_deref().or(exfil.owner.as_deref());
        match owner {
            Some(owner) => {
                if !owner.eq_ignore_ascii_case(&exfil.actor) {
                    score += 0.10;
                    reasons.push("sharing someone else's file".to_string());
                }
            }
            None => {
                if !baseline.insufficient_history
                    && baseline.own_file_share_ratio < OWN_SHARE_RATIO_FLOOR
                {
                    score += 0.10;
                    reasons.push("history of sharing files they do not own".to_string());
                }
            }
        }

        if is_off_hours(exfil.timestamp, &self.tz) {
            score += 0.10;
            reasons.push("off-hours activity".to_string());
        }

        if recon_score >= 10.0 {
            score += 0.15;
            reasons.push("high cumulative recon".to_string());
        }

        if file_context.sensitivity == Sensitivity::High {
            score += 0.15;
            reasons.push("high-sensitivity file".to_string());
        }

        if file_context.shared_externally_before && seen_before {
            score -= 0.10;
            reasons.push("file previously shared with this destination".to_string());
        }

        let routine = !baseline.insufficient_history
            && baseline.external_share_frequency > ROUTINE_SHARES_PER_DAY;
        if routine {
            score -= 0.10;
            reasons.push("routine external sharer".to_string());
        }

        let score = score.clamp(0.0, 1.0);
        let intent = if score >= self.malicious_threshold {
            Intent::Malicious
        } else if score >= self.suspicious_threshold {
            Intent::Suspicious
        } else {
            Intent::Benign
        };

        IntentAnalysis {
            intent,
            confidence: trunc2((score - 0.5).abs() * 2.0),
            reasons,
            should_suppress: intent == Intent::Benign && (allowed || routine),
            destination_domain: destination,
        }
    }
}
