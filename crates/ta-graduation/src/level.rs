// level.rs — The three autonomy levels a category can hold.
//
// The levels are a closed set with a fixed order. Transitions between them
// are decided by the engine as explicit named targets, never by stepping an
// index up or down.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraduationError;

/// How much human supervision a category of agent actions requires.
///
/// Ordered from most to least supervised, so `ApprovalRequired < Supervised
/// < Autonomous` holds with the derived `Ord`.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Every action needs explicit human approval. The floor.
    #[default]
    ApprovalRequired,
    /// Actions execute but are logged and reviewable.
    Supervised,
    /// Actions execute silently. The ceiling.
    Autonomous,
}

impl AutonomyLevel {
    /// All levels, floor first.
    pub const ALL: [AutonomyLevel; 3] = [
        AutonomyLevel::ApprovalRequired,
        AutonomyLevel::Supervised,
        AutonomyLevel::Autonomous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::ApprovalRequired => "approval_required",
            AutonomyLevel::Supervised => "supervised",
            AutonomyLevel::Autonomous => "autonomous",
        }
    }

    pub fn is_floor(&self) -> bool {
        matches!(self, AutonomyLevel::ApprovalRequired)
    }

    pub fn is_ceiling(&self) -> bool {
        matches!(self, AutonomyLevel::Autonomous)
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AutonomyLevel {
    type Err = GraduationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AutonomyLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| GraduationError::InvalidLevel {
                level: s.to_string(),
            })
    }
}
