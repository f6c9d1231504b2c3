//! File-context enrichment with a bounded LRU cache.
//!
//! Metadata lookups go through `FileMetadataSource`; results are cached with
//! a one-hour TTL (five minutes for negative results) in a size-bounded map.
//! Enrichment is best-effort: a source error yields a synthetic context with
//! unknown sensitivity and never fails the finding.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

use itd_core::{DetectorError, FileContextInfo, Sensitivity};

use crate::directory::DirectoryResolver;
use crate::util::{with_retry, BACKEND_RETRIES, RETRY_BACKOFF};

/// Default cache bound.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Raw metadata as returned by the file service.
#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub shared_externally: bool,
    #[serde(default)]
    pub parent_folder: Option<String>,
}

/// Lookup interface onto the file service.
pub trait FileMetadataSource: Send + Sync {
    /// `Ok(None)` means not found or permission denied (cacheable negative).
    fn fetch(&self, doc_id: &str) -> Result<Option<FileMetadata>, DetectorError>;
}

/// Source used when no metadata backing is configured.
pub struct NullFileMetadataSource;

impl FileMetadataSource for NullFileMetadataSource {
    fn fetch(&self, _doc_id: &str) -> Result<Option<FileMetadata>, DetectorError> {
        Ok(None)
    }
}

/// Static map source, loadable from a JSON file keyed by doc id. Used for
/// offline runs and tests.
pub struct StaticFileMetadataSource {
    files: HashMap<String, FileMetadata>,
}

impl StaticFileMetadataSource {
    pub fn new(files: HashMap<String, FileMetadata>) -> Self {
        Self { files }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, DetectorError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DetectorError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let files = serde_json::from_str(&content).map_err(|e| {
            DetectorError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Self { files })
    }
}

impl FileMetadataSource for StaticFileMetadataSource {
    fn fetch(&self, doc_id: &str) -> Result<Option<FileMetadata>, DetectorError> {
        Ok(self.files.get(doc_id).cloned())
    }
}

/// Enriched, derived context for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct FileContext {
    pub doc_id: String,
    pub owner: Option<String>,
    pub labels: Vec<String>,
    pub sensitivity: Sensitivity,
    pub shared_externally_before: bool,
    pub parent_folder: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl FileContext {
    /// Synthetic context when enrichment was unavailable.
    pub fn unknown(doc_id: &str, fetched_at: DateTime<Utc>) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            owner: None,
            labels: Vec::new(),
            sensitivity: Sensitivity::Unknown,
            shared_externally_before: false,
            parent_folder: None,
            fetched_at,
        }
    }

    pub fn to_info(&self) -> FileContextInfo {
        FileContextInfo {
            sensitivity: self.sensitivity,
            labels: self.labels.clone(),
            owner: self.owner.clone(),
            shared_externally_before: self.shared_externally_before,
        }
    }
}

struct CacheSlot {
    context: FileContext,
    negative: bool,
    last_access: u64,
}

struct CacheInner {
    slots: HashMap<String, CacheSlot>,
    tick: u64,
}

pub struct FileContextProvider {
    source: Arc<dyn FileMetadataSource>,
    directory: Arc<dyn DirectoryResolver>,
    cache: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
    negative_ttl: Duration,
    sensitive_labels: Vec<String>,
    high_risk_ous: Vec<String>,
}

/// Label fragments that mark an explicit classification label.
const CLASSIFICATION_TERMS: [&str; 5] =
    ["confidential", "restricted", "internal", "sensitive", "private"];

impl FileContextProvider {
    pub fn new(
        source: Arc<dyn FileMetadataSource>,
        directory: Arc<dyn DirectoryResolver>,
        sensitive_labels: &[String],
        high_risk_ous: &[String],
    ) -> Self {
        Self::with_capacity(
            source,
            directory,
            sensitive_labels,
            high_risk_ous,
            DEFAULT_CACHE_CAPACITY,
        )
    }

    pub fn with_capacity(
        source: Arc<dyn FileMetadataSource>,
        directory: Arc<dyn DirectoryResolver>,
        sensitive_labels: &[String],
        high_risk_ous: &[String],
        capacity: usize,
    ) -> Self {
        Self {
            source,
            directory,
            cache: Mutex::new(CacheInner {
                slots: HashMap::new(),
                tick: 0,
            }),
            capacity: capacity.max(1),
            ttl: Duration::hours(1),
            negative_ttl: Duration::minutes(5),
            sensitive_labels: sensitive_labels
                .iter()
                .map(|l| l.to_ascii_lowercase())
                .collect(),
            high_risk_ous: high_risk_ous.to_vec(),
        }
    }

    /// Look up context for a document. Never fails.
    pub fn get(&self, doc_id: &str, now: DateTime<Utc>) -> FileContext {
        {
            let mut cache = self.cache.lock();
            cache.tick += 1;
            let tick = cache.tick;
            if let Some(slot) = cache.slots.get_mut(doc_id) {
                let ttl = if slot.negative { self.negative_ttl } else { self.ttl };
                if now - slot.context.fetched_at <= ttl {
                    slot.last_access = tick;
                    return slot.context.clone();
                }
            }
        }

        let fetched = with_retry("file metadata fetch", BACKEND_RETRIES, RETRY_BACKOFF, || {
            self.source.fetch(doc_id)
        });

        match fetched {
            Ok(Some(metadata)) => {
                let context = self.build_context(doc_id, metadata, now);
                self.insert(doc_id, context.clone(), false);
                context
            }
            Ok(None) => {
                tracing::debug!("no metadata for {}", doc_id);
                let context = FileContext::unknown(doc_id, now);
                self.insert(doc_id, context.clone(), true);
                context
            }
            Err(err) => {
                tracing::warn!("file metadata fetch failed for {}: {}", doc_id, err);
                FileContext::unknown(doc_id, now)
            }
        }
    }

    fn insert(&self, doc_id: &str, context: FileContext, negative: bool) {
        let mut cache = self.cache.lock();
        cache.tick += 1;
        let tick = cache.tick;
        cache.slots.insert(
            doc_id.to_string(),
            CacheSlot {
                context,
                negative,
                last_access: tick,
            },
        );
        // Size-based eviction: drop least-recently-used slots over capacity.
        while cache.slots.len() > self.capacity {
            let oldest = cache
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_access)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    cache.slots.remove(&key);
                }
                None => break,
            }
        }
    }

    fn build_context(
        &self,
        doc_id: &str,
        metadata: FileMetadata,
        now: DateTime<Utc>,
    ) -> FileContext {
        let labels: BTreeSet<String> = metadata
            .labels
            .iter()
            .map(|l| l.to_ascii_lowercase())
            .collect();
        let sensitivity = self.derive_sensitivity(&labels, metadata.owner.as_deref());
        FileContext {
            doc_id: doc_id.to_string(),
            owner: metadata.owner,
            labels: labels.into_iter().collect(),
            sensitivity,
            shared_externally_before: metadata.shared_externally,
            parent_folder: metadata.parent_folder,
            fetched_at: now,
        }
    }

    fn derive_sensitivity(&self, labels: &BTreeSet<String>, owner: Option<&str>) -> Sensitivity {
        if labels.iter().any(|l| self.sensitive_labels.contains(l)) {
            return Sensitivity::High;
        }
        if let Some(owner) = owner {
            if let Some(ou) = self.directory.org_unit(owner) {
                if self.high_risk_ous.contains(&ou) {
                    return Sensitivity::High;
                }
            }
        }
        let has_classification = labels
            .iter()
            .any(|l| CLASSIFICATION_TERMS.iter().any(|term| l.contains(term)));
        if has_classification {
            Sensitivity::Medium
        } else {
            Sensitivity::Low
        }
    }
}
