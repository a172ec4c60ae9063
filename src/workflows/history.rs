// Status history timeline, derived from the timestamps on a workflow record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::achievements::{AchievementStatus, UserId, WorkflowRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: AchievementStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Chronological timeline for a record.
///
/// Always starts with the draft entry at creation time. A resubmitted record
/// only shows its latest submission cycle since review fields are cleared on
/// resubmit.
pub fn timeline(record: &WorkflowRecord) -> Vec<HistoryEntry> {
    let mut entries = vec![HistoryEntry {
        status: AchievementStatus::Draft,
        timestamp: record.created_at,
        actor: Some(record.student_id.clone()),
        note: None,
    }];

    if let Some(submitted_at) = record.submitted_at {
        entries.push(HistoryEntry {
            status: AchievementStatus::Submitted,
            timestamp: submitted_at,
            actor: record.submitted_by.clone(),
            note: None,
        });
    }

    if let Some(reviewed_at) = record.verified_at {
        match record.status {
            AchievementStatus::Verified | AchievementStatus::Rejected => {
                entries.push(HistoryEntry {
                    status: record.status,
                    timestamp: reviewed_at,
                    actor: record.verified_by.clone(),
                    note: record.rejection_note.clone(),
                });
            }
            _ => {}
        }
    }

    entries.sort_by_key(|entry| entry.timestamp);
    entries
}
