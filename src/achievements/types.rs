use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::details::AchievementDetails;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }
    };
}

string_id!(
    /// Identity of an authenticated user (student, advisor or administrator).
    UserId
);
string_id!(
    /// Primary key of a workflow record in the relational store.
    WorkflowId
);
string_id!(
    /// Id generated by the document store, kept as its hex string form.
    DocumentId
);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl DocumentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
    Advisor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
            Role::Advisor => "advisor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            "advisor" => Ok(Role::Advisor),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An authenticated caller as handed over by the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub identity: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(identity: impl Into<UserId>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }

    pub fn student(identity: impl Into<UserId>) -> Self {
        Self::new(identity, Role::Student)
    }

    pub fn advisor(identity: impl Into<UserId>) -> Self {
        Self::new(identity, Role::Advisor)
    }

    pub fn admin(identity: impl Into<UserId>) -> Self {
        Self::new(identity, Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
}

impl AchievementStatus {
    pub const ALL: [AchievementStatus; 4] = [
        AchievementStatus::Draft,
        AchievementStatus::Submitted,
        AchievementStatus::Verified,
        AchievementStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementStatus::Draft => "draft",
            AchievementStatus::Submitted => "submitted",
            AchievementStatus::Verified => "verified",
            AchievementStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AchievementStatus::Draft),
            "submitted" => Ok(AchievementStatus::Submitted),
            "verified" => Ok(AchievementStatus::Verified),
            "rejected" => Ok(AchievementStatus::Rejected),
            other => Err(format!("unknown achievement status: {other}")),
        }
    }
}

/// Canonical lifecycle row for one achievement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub student_id: UserId,
    pub document_id: DocumentId,
    pub status: AchievementStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Identity that performed the latest submission.
    #[serde(default)]
    pub submitted_by: Option<UserId>,
    /// Review timestamp, set when the record is verified or rejected.
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<UserId>,
    pub rejection_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WorkflowRecord {
    pub fn new_draft(student_id: UserId, document_id: DocumentId, now: DateTime<Utc>) -> Self {
        Self {
            id: WorkflowId::generate(),
            student_id,
            document_id,
            status: AchievementStatus::Draft,
            submitted_at: None,
            submitted_by: None,
            verified_at: None,
            verified_by: None,
            rejection_note: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    /// Reference returned by blob storage.
    pub file_url: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Student-editable part of an achievement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementContent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub details: AchievementDetails,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
}

impl AchievementContent {
    pub fn new(title: impl Into<String>, details: AchievementDetails) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            details,
            tags: Vec::new(),
            points: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_points(mut self, points: u32) -> Self {
        self.points = Some(points);
        self
    }

    pub fn category(&self) -> &str {
        self.details.category()
    }

    /// Check title, category and the category-specific required fields.
    pub fn validate(&self) -> Result<(), String> {
        let mut missing: Vec<&str> = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.category().trim().is_empty() {
            missing.push("achievement_type");
        }
        missing.extend(self.details.missing_fields());

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing required fields: {}", missing.join(", ")))
        }
    }
}

/// Free-form achievement payload held by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub student_id: UserId,
    #[serde(flatten)]
    pub content: AchievementContent,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Document-store insert payload; the store assigns the id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub student_id: UserId,
    pub content: AchievementContent,
}

/// The joined view: lifecycle record plus its document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub record: WorkflowRecord,
    pub document: DocumentRecord,
}

impl Achievement {
    pub fn id(&self) -> &WorkflowId {
        &self.record.id
    }

    pub fn status(&self) -> AchievementStatus {
        self.record.status
    }

    pub fn content(&self) -> &AchievementContent {
        &self.document.content
    }
}
