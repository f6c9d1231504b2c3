//! Webhook alert dispatch.
//!
//! Posts the findings that match the configured severities as a JSON array.
//! One retry; a final failure is an emission error (exit code 3), since the
//! findings file has already been written by then.

use std::collections::HashSet;

use itd_core::{DetectorError, Finding, Severity};

use crate::config::AlertingConfig;
use crate::util::{with_retry, CALL_TIMEOUT, RETRY_BACKOFF};

pub struct WebhookDispatcher {
    url: String,
    severities: HashSet<Severity>,
    client: reqwest::blocking::Client,
}

impl WebhookDispatcher {
    /// None when no webhook is configured.
    pub fn from_config(config: &AlertingConfig) -> Result<Option<Self>, DetectorError> {
        let Some(url) = &config.webhook_url else {
            return Ok(None);
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| DetectorError::Config(format!("webhook client: {}", e)))?;
        Ok(Some(Self {
            url: url.clone(),
            severities: config.alert_on_severities.iter().copied().collect(),
            client,
        }))
    }

    pub fn select<'a>(&self, findings: &'a [Finding]) -> Vec<&'a Finding> {
        findings
            .iter()
            .filter(|f| self.severities.contains(&f.severity))
            .collect()
    }

    /// Post matching findings. Returns how many were sent.
    pub fn dispatch(&self, findings: &[Finding]) -> Result<usize, DetectorError> {
        let selected = self.select(findings);
        if selected.is_empty() {
            return Ok(0);
        }

        with_retry("webhook post", 1, RETRY_BACKOFF, || {
            let response = self
                .client
                .post(&self.url)
                .json(&selected)
                .send()
                .map_err(|e| DetectorError::Emission(format!("webhook post: {}", e)))?;
            response
                .error_for_status()
                .map_err(|e| DetectorError::Emission(format!("webhook status: {}", e)))?;
            Ok(())
        })?;

        tracing::info!("dispatched {} findings to webhook", selected.len());
        Ok(selected.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itd_core::{EventIds, FileContextInfo, Intent, IntentAnalysis};

    fn finding(severity: Severity) -> Finding {
        Finding {
            severity,
            actor: "u@x.com".to_string(),
            exfil_event: "download".to_string(),
            exfil_time: "2025-01-15T14:23:45+00:00".to_string(),
            doc_id: None,
            doc_title: None,
            recon_action: None,
            recon_time: None,
            delta_minutes: None,
            visibility: None,
            reason: "test".to_string(),
            event_ids: EventIds {
                recon: None,
                exfil: "e1".to_string(),
            },
            recon_score: 0.0,
            file_context: FileContextInfo::unknown(),
            intent_analysis: IntentAnalysis {
                intent: Intent::Suspicious,
                confidence: 0.0,
                reasons: Vec::new(),
                should_suppress: false,
                destination_domain: None,
            },
        }
    }

    #[test]
    fn test_selection_respects_configured_severities() {
        let dispatcher = WebhookDispatcher::from_config(&AlertingConfig {
            webhook_url: Some("https://hooks.example/itd".to_string()),
            alert_on_severities: vec![Severity::High],
        })
        .unwrap()
        .unwrap();

        let findings = vec![
            finding(Severity::High),
            finding(Severity::Medium),
            finding(Severity::Low),
        ];
        let selected = dispatcher.select(&findings);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].severity, Severity::High);
    }

    #[test]
    fn test_no_webhook_configured() {
        let dispatcher = WebhookDispatcher::from_config(&AlertingConfig::default()).unwrap();
        assert!(dispatcher.is_none());
    }
}
