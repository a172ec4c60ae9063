// Achievement lifecycle state machine
//
// draft -> submitted -> {verified, rejected}, rejected -> submitted.
// Pure decision logic; the engine applies the result to the stores.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::WorkflowError;
use crate::achievements::AchievementStatus;

/// Every operation the guard and the state machine reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    Create,
    Read,
    Update,
    Delete,
    Submit,
    Verify,
    Reject,
    AddAttachment,
}

impl WorkflowEvent {
    pub const ALL: [WorkflowEvent; 8] = [
        WorkflowEvent::Create,
        WorkflowEvent::Read,
        WorkflowEvent::Update,
        WorkflowEvent::Delete,
        WorkflowEvent::Submit,
        WorkflowEvent::Verify,
        WorkflowEvent::Reject,
        WorkflowEvent::AddAttachment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEvent::Create => "create",
            WorkflowEvent::Read => "read",
            WorkflowEvent::Update => "update",
            WorkflowEvent::Delete => "delete",
            WorkflowEvent::Submit => "submit",
            WorkflowEvent::Verify => "verify",
            WorkflowEvent::Reject => "reject",
            WorkflowEvent::AddAttachment => "add an attachment to",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, WorkflowEvent::Read)
    }
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an event leaves an existing achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Status(AchievementStatus),
    /// Soft-deleted from both stores; excluded from all later reads.
    Removed,
}

/// Apply `event` to an achievement currently in `from`.
///
/// `Create` never applies to an existing achievement; new achievements always
/// start in `draft`.
pub fn transition(
    from: AchievementStatus,
    event: WorkflowEvent,
) -> Result<TransitionOutcome, WorkflowError> {
    use AchievementStatus::*;
    use TransitionOutcome::{Removed, Status};

    let outcome = match (from, event) {
        (status, WorkflowEvent::Read) => Status(status),
        (Draft, WorkflowEvent::Submit) | (Rejected, WorkflowEvent::Submit) => Status(Submitted),
        (Submitted, WorkflowEvent::Verify) => Status(Verified),
        (Submitted, WorkflowEvent::Reject) => Status(Rejected),
        (Draft, WorkflowEvent::Update) | (Draft, WorkflowEvent::AddAttachment) => Status(Draft),
        (Draft, WorkflowEvent::Delete) => Removed,
        (from, event) => return Err(WorkflowError::InvalidTransition { from, event }),
    };
    Ok(outcome)
}

/// Mutating events accepted from `status`.
pub fn allowed_events(status: AchievementStatus) -> Vec<WorkflowEvent> {
    WorkflowEvent::ALL
        .into_iter()
        .filter(|event| event.is_mutating())
        .filter(|event| transition(status, *event).is_ok())
        .collect()
}

/// Statuses reachable from `status` in one step, excluding itself.
pub fn successors(status: AchievementStatus) -> Vec<AchievementStatus> {
    let mut next = Vec::new();
    for event in WorkflowEvent::ALL {
        if let Ok(TransitionOutcome::Status(to)) = transition(status, event) {
            if to != status && !next.contains(&to) {
                next.push(to);
            }
        }
    }
    next
}
