use serde::{Deserialize, Serialize};

/// Finding severity. Variant order gives `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Raise severity by `steps`, saturating at `High`.
    pub fn step_up(self, steps: u8) -> Self {
        let mut current = self;
        for _ in 0..steps {
            current = match current {
                Severity::Low => Severity::Medium,
                Severity::Medium | Severity::High => Severity::High,
            };
        }
        current
    }

    /// Rank for output ordering: `high` findings sort first.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
