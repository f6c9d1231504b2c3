//! Canonical audit event records.
//!
//! Adapters normalize raw audit-log entries into these typed records and
//! validate them at the boundary; everything downstream works on clean data.
//! Enum values the adapter does not recognize land on an explicit `Unknown`
//! variant so a single odd event never aborts a batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Assistant feature invocations that count as reconnaissance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReconAction {
    AskAboutThisFile,
    SummarizeFile,
    AnalyzeDocuments,
    CatchMeUp,
    ReportUnspecifiedFiles,
    HelpMeWrite,
    Proofread,
    SearchWeb,
    #[serde(other)]
    Unknown,
}

impl ReconAction {
    /// Cumulative-score weight added per observation.
    pub fn weight(&self) -> f64 {
        match self {
            ReconAction::AskAboutThisFile
            | ReconAction::SummarizeFile
            | ReconAction::AnalyzeDocuments
            | ReconAction::CatchMeUp
            | ReconAction::ReportUnspecifiedFiles => 2.0,
            ReconAction::HelpMeWrite | ReconAction::Proofread => 0.5,
            ReconAction::SearchWeb => 1.0,
            ReconAction::Unknown => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconAction::AskAboutThisFile => "ask_about_this_file",
            ReconAction::SummarizeFile => "summarize_file",
            ReconAction::AnalyzeDocuments => "analyze_documents",
            ReconAction::CatchMeUp => "catch_me_up",
            ReconAction::ReportUnspecifiedFiles => "report_unspecified_files",
            ReconAction::HelpMeWrite => "help_me_write",
            ReconAction::Proofread => "proofread",
            ReconAction::SearchWeb => "search_web",
            ReconAction::Unknown => "unknown",
        }
    }
}

/// Workspace application the assistant was invoked from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReconApp {
    Docs,
    Drive,
    Sheets,
    Slides,
    Gmail,
    Meet,
    #[serde(other)]
    Unknown,
}

/// File-service audit actions that change a file's reachability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExfilKind {
    ChangeVisibility,
    ChangeAcl,
    Download,
    Export,
    Copy,
    AddToFolder,
    #[serde(other)]
    Unknown,
}

impl ExfilKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExfilKind::ChangeVisibility => "change_visibility",
            ExfilKind::ChangeAcl => "change_acl",
            ExfilKind::Download => "download",
            ExfilKind::Export => "export",
            ExfilKind::Copy => "copy",
            ExfilKind::AddToFolder => "add_to_folder",
            ExfilKind::Unknown => "unknown",
        }
    }
}

/// File visibility states as reported by the file service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Domain,
    PeopleWithLink,
    PublicOnTheWeb,
    SharedExternally,
    #[serde(other)]
    Unknown,
}

impl Visibility {
    /// True when the state exposes the file beyond the tenant.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Visibility::PeopleWithLink | Visibility::PublicOnTheWeb | Visibility::SharedExternally
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Domain => "domain",
            Visibility::PeopleWithLink => "people_with_link",
            Visibility::PublicOnTheWeb => "public_on_the_web",
            Visibility::SharedExternally => "shared_externally",
            Visibility::Unknown => "unknown",
        }
    }
}

/// An assistant activity event attributed to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconEvent {
    pub event_id: String,
    pub actor: String,
    pub action: ReconAction,
    pub app: ReconApp,
    #[serde(default)]
    pub doc_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ReconEvent {
    /// Boundary validation. Returns the offending field name on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.event_id.is_empty() {
            return Err("event_id".to_string());
        }
        if self.actor.is_empty() {
            return Err("actor".to_string());
        }
        if self.action == ReconAction::Unknown {
            return Err("action".to_string());
        }
        Ok(())
    }
}

/// A file-service audit event attributed to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExfilEvent {
    pub event_id: String,
    pub actor: String,
    pub event_type: ExfilKind,
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub doc_title: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub new_value: Option<String>,
    #[serde(default)]
    pub old_value: Option<String>,
    #[serde(default)]
    pub destination_acl: Option<String>,
    #[serde(default)]
    pub destination_folder_id: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Set by revert detection when this event is half of an
    /// external-toggle-then-revert pair. Never read from input.
    #[serde(default, skip_serializing, skip_deserializing)]
    pub is_revert: bool,
}

impl ExfilEvent {
    pub fn validate(&self) -> Result<(), String> {
        if self.event_id.is_empty() {
            return Err("event_id".to_string());
        }
        if self.actor.is_empty() {
            return Err("actor".to_string());
        }
        if self.event_type == ExfilKind::Unknown {
            return Err("event_type".to_string());
        }
        Ok(())
    }

    /// Destination domain of the share target, lowercased.
    ///
    /// Taken from `destination_acl` when present (either a bare domain or an
    /// email address), otherwise from an email-shaped `new_value`.
    pub fn destination_domain(&self) -> Option<String> {
        if let Some(acl) = &self.destination_acl {
            let acl = acl.trim();
            if acl.is_empty() {
                return None;
            }
            return Some(domain_part(acl));
        }
        match &self.new_value {
            Some(v) if v.contains('@') => Some(domain_part(v.trim())),
            _ => None,
        }
    }

    /// True when this event grants access outside the tenant: an external
    /// visibility state, or an ACL/visibility change whose destination domain
    /// differs from `primary_domain`.
    pub fn is_external_share(&self, primary_domain: Option<&str>) -> bool {
        if !matches!(
            self.event_type,
            ExfilKind::ChangeVisibility | ExfilKind::ChangeAcl
        ) {
            return false;
        }
        if self.visibility.map(|v| v.is_external()).unwrap_or(false) {
            return true;
        }
        match (self.destination_domain(), primary_domain) {
            (Some(dest), Some(primary)) => !dest.eq_ignore_ascii_case(primary),
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// The exfil channels the severity rubric treats as high risk:
    /// external shares, exports and downloads.
    pub fn is_high_risk_channel(&self, primary_domain: Option<&str>) -> bool {
        matches!(self.event_type, ExfilKind::Export | ExfilKind::Download)
            || self.is_external_share(primary_domain)
    }

    /// Domain of the acting identity, lowercased.
    pub fn actor_domain(&self) -> Option<String> {
        if self.actor.contains('@') {
            Some(domain_part(&self.actor))
        } else {
            None
        }
    }
}

fn domain_part(addr: &str) -> String {
    match addr.rsplit_once('@') {
        Some((_, domain)) => domain.to_ascii_lowercase(),
        None => addr.to_ascii_lowercase(),
    }
}
