use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MaestroError, Result};

/// Lifecycle status shared by workflows, jobs and delegations.
///
/// Every record flows through: PENDING → RUNNING → {COMPLETED | FAILED},
/// with CANCELLED reachable from PENDING or RUNNING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "PENDING"),
            Status::Running => write!(f, "RUNNING"),
            Status::Completed => write!(f, "COMPLETED"),
            Status::Failed => write!(f, "FAILED"),
            Status::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Legality table for status transitions.
///
/// Transitions are strictly forward: no state is ever revisited and terminal
/// states accept nothing.
pub struct StateMachine;

impl StateMachine {
    pub fn can_transition(from: Status, to: Status) -> bool {
        matches!(
            (from, to),
            (Status::Pending, Status::Running)
                | (Status::Running, Status::Completed)
                | (Status::Running, Status::Failed)
                | (Status::Pending, Status::Cancelled)
                | (Status::Running, Status::Cancelled)
        )
    }

    /// Validate `from → to`, returning the new status or `InvalidState`.
    pub fn transition(from: Status, to: Status) -> Result<Status> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(MaestroError::InvalidState(format!(
                "cannot transition from {from} to {to}"
            )))
        }
    }
}
