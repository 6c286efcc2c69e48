//! Lifecycle states of a hosted assistant run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status reported by a hosted assistant run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted but not started.
    Queued,
    /// Model is working.
    InProgress,
    /// Run is blocked on tool outputs.
    RequiresAction,
    /// Cancellation requested.
    Cancelling,
    /// Run was cancelled.
    Cancelled,
    /// Run failed.
    Failed,
    /// Run produced a final answer.
    Completed,
    /// Run expired before completing.
    Expired,
}

impl RunStatus {
    /// Statuses after which a run never changes again.
    pub const FINAL: [Self; 4] = [Self::Completed, Self::Failed, Self::Cancelled, Self::Expired];

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
