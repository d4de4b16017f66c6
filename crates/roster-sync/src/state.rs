use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a pass is in its lifecycle.
///
/// `Fetching → Diffing → Sequencing → Applying → Complete`, with `Failed`,
/// `Aborted` and `Cancelled` as the other terminal states. A dry run moves
/// from `Sequencing` straight to `Complete`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    #[default]
    Fetching,
    Diffing,
    Sequencing,
    Applying,
    Complete,
    /// A snapshot could not be fetched.
    Failed,
    /// Configuration error, or the target refused credentials.
    Aborted,
    Cancelled,
}

impl PassState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::Sequencing => "sequencing",
            Self::Applying => "applying",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Aborted | Self::Cancelled
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PassState) -> bool {
        use PassState::*;
        matches!(
            (self, next),
            (Fetching, Diffing)
                | (Fetching, Failed)
                | (Diffing, Sequencing)
                | (Diffing, Aborted)
                | (Sequencing, Applying)
                | (Sequencing, Complete)
                | (Sequencing, Aborted)
                | (Applying, Complete)
                | (Applying, Aborted)
                | (Applying, Cancelled)
        )
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
