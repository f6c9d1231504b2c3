//! Finding records emitted by the engine.
//!
//! Serialization is stable: struct field order is the wire order, optional
//! fields serialize as explicit nulls, and fractional values are truncated
//! to two decimals before they reach serde. Replaying a batch must produce
//! byte-identical output.

use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Coarse file classification derived from labels and ownership.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
    Unknown,
}

impl Sensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Low => "low",
            Sensitivity::Medium => "medium",
            Sensitivity::High => "high",
            Sensitivity::Unknown => "unknown",
        }
    }
}

/// Classifier verdict for a candidate finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Malicious,
    Suspicious,
    Benign,
}

/// Source event ids backing a finding. `recon` is null for delayed matches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventIds {
    pub recon: Option<String>,
    pub exfil: String,
}

/// File metadata summary attached to a finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileContextInfo {
    pub sensitivity: Sensitivity,
    pub labels: Vec<String>,
    pub owner: Option<String>,
    pub shared_externally_before: bool,
}

impl FileContextInfo {
    /// Placeholder used when enrichment was unavailable.
    pub fn unknown() -> Self {
        Self {
            sensitivity: Sensitivity::Unknown,
            labels: Vec::new(),
            owner: None,
            shared_externally_before: false,
        }
    }
}

/// Intent classification attached to a finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentAnalysis {
    pub intent: Intent,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub should_suppress: bool,
    pub destination_domain: Option<String>,
}

/// One correlated recon/exfil attribution.
///
/// Field order here is the serialized key order; do not reorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub severity: Severity,
    pub actor: String,
    pub exfil_event: String,
    pub exfil_time: String,
    pub doc_id: Option<String>,
    pub doc_title: Option<String>,
    pub recon_action: Option<String>,
    pub recon_time: Option<String>,
    pub delta_minutes: Option<f64>,
    pub visibility: Option<String>,
    pub reason: String,
    pub event_ids: EventIds,
    pub recon_score: f64,
    pub file_context: FileContextInfo,
    pub intent_analysis: IntentAnalysis,
}

/// Truncate to two decimal places (toward zero).
///
/// The nudge keeps values that are exactly representable in decimal from
/// slipping a cent under binary representation error (333s / 60 must render
/// as 5.55, not 5.54).
pub fn trunc2(value: f64) -> f64 {
    ((value * 100.0) + 1e-6).trunc() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trunc2() {
        assert_eq!(trunc2(5.5551), 5.55);
        assert_eq!(trunc2(5.559), 5.55);
        assert_eq!(trunc2(0.0), 0.0);
        assert_eq!(trunc2(99.999), 99.99);
        // 333 seconds as minutes survives the binary representation.
        assert_eq!(trunc2(333.0 / 60.0), 5.55);
    }

    #[test]
    fn test_finding_key_order() {
        let finding = Finding {
            severity: Severity::High,
            actor: "u@x.com".to_string(),
            exfil_event: "change_visibility".to_string(),
            exfil_time: "2025-01-15T14:23:45+00:00".to_string(),
            doc_id: Some("D1".to_string()),
            doc_title: None,
            recon_action: Some("summarize_file".to_string()),
            recon_time: Some("2025-01-15T14:18:12+00:00".to_string()),
            delta_minutes: Some(5.55),
            visibility: Some("people_with_link".to_string()),
            reason: "test".to_string(),
            event_ids: EventIds {
                recon: Some("r1".to_string()),
                exfil: "e1".to_string(),
            },
            recon_score: 1.99,
            file_context: FileContextInfo::unknown(),
            intent_analysis: IntentAnalysis {
                intent: Intent::Suspicious,
                confidence: 0.0,
                reasons: Vec::new(),
                should_suppress: false,
                destination_domain: None,
            },
        };

        let json = serde_json::to_string(&finding).unwrap();
        let severity_at = json.find("\"severity\"").unwrap();
        let actor_at = json.find("\"actor\"").unwrap();
        let ids_at = json.find("\"event_ids\"").unwrap();
        let intent_at = json.find("\"intent_analysis\"").unwrap();
        assert!(severity_at < actor_at);
        assert!(actor_at < ids_at);
        assert!(ids_at < intent_at);
        // Nulls stay explicit in the record.
        assert!(json.contains("\"doc_title\":null"));
    }
}
