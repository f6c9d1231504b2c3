//! Error taxonomy for the detector.
//!
//! Per-event and per-backend failures are recovered locally by their
//! components; only configuration, source and emission failures surface
//! here and terminate a run. `exit_code` is the process-level contract.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("audit source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("backend error: {0}")]
    BackendTransient(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("emission failed: {0}")]
    Emission(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DetectorError {
    /// Process exit code for a fatal error of this kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            DetectorError::Config(_) | DetectorError::SourceUnavailable(_) => 2,
            DetectorError::BackendTransient(_)
            | DetectorError::MalformedEvent(_)
            | DetectorError::Emission(_)
            | DetectorError::Internal(_) => 3,
        }
    }
}
