// Achievement domain model
//
// A workflow record (relational row) and a document record (free-form
// payload) together make up one achievement.

pub mod details;
pub mod types;

pub use details::{
    AchievementDetails, CertificationDetails, CompetitionDetails, CompetitionLevel, DetailsError,
    OrganizationDetails, PublicationDetails, PublicationType,
};
pub use types::{
    Achievement, AchievementContent, AchievementStatus, Attachment, Caller, DocumentId,
    DocumentRecord, NewDocument, Role, UserId, WorkflowId, WorkflowRecord,
};
