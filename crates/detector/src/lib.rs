//! Insider-threat detection engine for cloud workspace audit logs.
//!
//! Correlates an AI-assistant activity stream (recon) with a file-service
//! activity stream (exfil) per actor, scores candidates with a rule-based
//! intent classifier, and emits ranked findings.
//!
//! Pipeline: adapters -> validate/dedup/clamp -> per-actor correlation
//! (immediate window match or delayed match via the decayed recon score)
//! -> intent classification -> severity resolution -> emission.

pub mod adapters;
pub mod alert;
pub mod baseline;
pub mod burst;
pub mod config;
pub mod correlate;
pub mod directory;
pub mod emit;
pub mod engine;
pub mod file_context;
pub mod intent;
pub mod kv;
pub mod recon;
pub mod severity;
pub mod util;

pub use adapters::{AuditSource, JsonlAuditSource, MemoryAuditSource};
pub use config::DetectorConfig;
pub use engine::{Engine, RunOutcome, RunStats};
pub use util::CancelToken;
