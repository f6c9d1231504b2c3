pub mod error;
pub mod event;
pub mod finding;
pub mod severity;
pub mod time;

pub use error::DetectorError;
pub use event::{ExfilEvent, ExfilKind, ReconAction, ReconApp, ReconEvent, Visibility};
pub use finding::{
    trunc2, EventIds, FileContextInfo, Finding, Intent, IntentAnalysis, Sensitivity,
};
pub use severity::Severity;
