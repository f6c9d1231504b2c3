//! Detector configuration.
//!
//! YAML/JSON configuration loaded before anything else; validation failures
//! abort the run before the first fetch (exit code 2).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use itd_core::{DetectorError, Severity};

/// Top-level detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// IANA zone used for off-hours checks and timestamp rendering
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Immediate-correlation window in minutes, range [1, 1440]
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,

    /// Cumulative recon score that qualifies a delayed match
    #[serde(default = "default_delayed_threshold")]
    pub delayed_threshold: f64,

    /// Half-life of the per-actor recon score
    #[serde(default = "default_half_life_hours")]
    pub recon_half_life_hours: f64,

    /// Recon state persistence backend
    #[serde(default)]
    pub recon_state_backend: ReconStateBackendConfig,

    #[serde(default)]
    pub suppressions: Suppressions,

    /// Known partner domains (softer signal than the allowlist)
    #[serde(default)]
    pub partner_domains: Vec<String>,

    /// Folder ids whose contents warrant a severity bump
    #[serde(default)]
    pub high_risk_folders: Vec<String>,

    #[serde(default)]
    pub severity_overrides: SeverityOverrides,

    #[serde(default)]
    pub alerting: AlertingConfig,

    #[serde(default)]
    pub intent: IntentThresholds,

    /// Planted tripwire documents; any exfil touching one is forced high
    #[serde(default)]
    pub canary_doc_ids: Vec<String>,

    /// Burstiness score at or above which recon run-ups are flagged
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: f64,

    /// Actor email to org-unit path, used when no directory service is wired
    #[serde(default)]
    pub org_units: HashMap<String, String>,

    /// Future timestamps beyond this tolerance are clamped to now
    #[serde(default = "default_skew_tolerance_minutes")]
    pub skew_tolerance_minutes: i64,

    /// Worker pool bound; defaults to available cores capped at 8
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// The tenant's own domain; destinations elsewhere are external
    #[serde(default)]
    pub primary_domain: Option<String>,

    #[serde(default)]
    pub sources: SourcesConfig,

    /// Static file-metadata map for offline runs (doc_id keyed JSON)
    #[serde(default)]
    pub file_metadata_path: Option<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            window_minutes: default_window_minutes(),
            delayed_threshold: default_delayed_threshold(),
            recon_half_life_hours: default_half_life_hours(),
            recon_state_backend: ReconStateBackendConfig::default(),
            suppressions: Suppressions::default(),
            partner_domains: Vec::new(),
            high_risk_folders: Vec::new(),
            severity_overrides: SeverityOverrides::default(),
            alerting: AlertingConfig::default(),
            intent: IntentThresholds::default(),
            canary_doc_ids: Vec::new(),
            burst_threshold: default_burst_threshold(),
            org_units: HashMap::new(),
            skew_tolerance_minutes: default_skew_tolerance_minutes(),
            max_workers: None,
            primary_domain: None,
            sources: SourcesConfig::default(),
            file_metadata_path: None,
        }
    }
}

/// Recon state persistence selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconStateBackendConfig {
    /// Ephemeral in-process store
    #[default]
    Memory,
    /// Remote key/value store shared across detector processes
    Kv { url: String },
}

/// Suppression lists applied after classification
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Suppressions {
    #[serde(default)]
    pub allowed_external_domains: Vec<String>,

    /// Org units whose activity is part of sanctioned investigations
    #[serde(default)]
    pub security_investigation_ous: Vec<String>,

    #[serde(default)]
    pub exclude_actors: Vec<String>,
}

/// Conditions that raise a finding's severity after the base rubric
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeverityOverrides {
    #[serde(default)]
    pub high_risk_ous: Vec<String>,

    #[serde(default)]
    pub sensitive_labels: Vec<String>,
}

/// Webhook alerting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_alert_severities")]
    pub alert_on_severities: Vec<Severity>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            alert_on_severities: default_alert_severities(),
        }
    }
}

/// Score-to-verdict thresholds for the intent classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentThresholds {
    #[serde(default = "default_malicious_threshold")]
    pub malicious_threshold: f64,

    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: f64,
}

impl Default for IntentThresholds {
    fn default() -> Self {
        Self {
            malicious_threshold: default_malicious_threshold(),
            suspicious_threshold: default_suspicious_threshold(),
        }
    }
}

/// Audit-log export files consumed by the JSONL adapter
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub recon_log: Option<PathBuf>,

    #[serde(default)]
    pub exfil_log: Option<PathBuf>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_window_minutes() -> i64 {
    30
}

fn default_delayed_threshold() -> f64 {
    5.0
}

fn default_half_life_hours() -> f64 {
    48.0
}

fn default_burst_threshold() -> f64 {
    6.0
}

fn default_skew_tolerance_minutes() -> i64 {
    5
}

fn default_alert_severities() -> Vec<Severity> {
    vec![Severity::High, Severity::Medium]
}

fn default_malicious_threshold() -> f64 {
    0.7
}

fn default_suspicious_threshold() -> f64 {
    0.4
}

impl DetectorConfig {
    /// Load from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self, DetectorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DetectorError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_yaml::from_str(&content)
            .map_err(|e| DetectorError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Load from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, DetectorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DetectorError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| DetectorError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Load by extension: `.json` parses as JSON, anything else as YAML
    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    /// Validate before any fetch. Also resolves the timezone.
    pub fn validate(&self) -> Result<Tz, DetectorError> {
        let tz: Tz = self
            .timezone
            .parse()
            .map_err(|_| DetectorError::Config(format!("invalid timezone: {}", self.timezone)))?;

        if !(1..=1440).contains(&self.window_minutes) {
            return Err(DetectorError::Config(format!(
                "window_minutes must be in [1, 1440], got {}",
                self.window_minutes
            )));
        }
        if self.delayed_threshold <= 0.0 {
            return Err(DetectorError::Config(
                "delayed_threshold must be positive".to_string(),
            ));
        }
        if self.recon_half_life_hours <= 0.0 {
            return Err(DetectorError::Config(
                "recon_half_life_hours must be positive".to_string(),
            ));
        }
        if self.intent.suspicious_threshold >= self.intent.malicious_threshold {
            return Err(DetectorError::Config(
                "intent.suspicious_threshold must be below intent.malicious_threshold".to_string(),
            ));
        }
        if let ReconStateBackendConfig::Kv { url } = &self.recon_state_backend {
            if url.is_empty() {
                return Err(DetectorError::Config(
                    "recon_state_backend.url must not be empty".to_string(),
                ));
            }
        }
        if self.skew_tolerance_minutes < 0 {
            return Err(DetectorError::Config(
                "skew_tolerance_minutes must not be negative".to_string(),
            ));
        }
        Ok(tz)
    }
}
