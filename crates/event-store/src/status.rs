//! Stored event lifecycle.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The lifecycle status of a stored event record.
///
/// State transitions:
/// ```text
/// Pending ──┐
///           ├──► Replaying ──┬──► Completed
/// Failed ◄──┘◄───────────────┘
/// ```
/// Records are created `Pending` (speculative durability copy) or `Failed`
/// (captured from a dead-letter queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Waiting to be published.
    Pending,

    /// Processing failed; eligible for replay.
    Failed,

    /// Currently being republished by the replay coordinator.
    Replaying,

    /// Republished successfully (terminal state).
    Completed,
}

impl EventStatus {
    /// Returns true if a record may be created in this status.
    pub fn is_initial(&self) -> bool {
        matches!(self, EventStatus::Pending | EventStatus::Failed)
    }

    /// Returns true if the replay coordinator may pick the record up.
    pub fn is_replayable(&self) -> bool {
        matches!(self, EventStatus::Pending | EventStatus::Failed)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed)
    }

    /// Returns the statuses from which `self` may be entered.
    pub fn allowed_predecessors(&self) -> &'static [EventStatus] {
        match self {
            EventStatus::Replaying => &[EventStatus::Pending, EventStatus::Failed],
            EventStatus::Completed | EventStatus::Failed => &[EventStatus::Replaying],
            EventStatus::Pending => &[],
        }
    }

    /// Returns true if a record in `self` may move to `next`.
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        next.allowed_predecessors().contains(self)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Failed => "failed",
            EventStatus::Replaying => "replaying",
            EventStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EventStatus::Pending),
            "failed" => Ok(EventStatus::Failed),
            "replaying" => Ok(EventStatus::Replaying),
            "completed" => Ok(EventStatus::Completed),
            other => Err(other.to_string()),
        }
    }
}
