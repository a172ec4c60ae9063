//! Store adapters
//!
//! The workflow engine talks to two independent stores through the traits in
//! this module: a relational store holding [`WorkflowRecord`] rows and a
//! document store holding [`DocumentRecord`] payloads. Each method is a single
//! atomic write or read against its store; there is no cross-store
//! transaction.
//!
//! Both traits are mockable with `mockall` (`MockDocumentStore`,
//! `MockWorkflowStore`) in unit tests or with the `testing` feature.

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::achievements::{
    AchievementContent, AchievementStatus, Attachment, DocumentId, DocumentRecord, NewDocument,
    UserId, WorkflowId, WorkflowRecord,
};

pub use memory::{InMemoryDocumentStore, InMemoryWorkflowStore};
#[cfg(feature = "database")]
pub use sqlite::{SqliteDocumentStore, SqliteWorkflowStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Workflow record {id} is {actual}")]
    StatusConflict {
        id: String,
        actual: AchievementStatus,
    },

    #[error("Corrupt stored value in {column}: {reason}")]
    Corrupt { column: &'static str, reason: String },

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn document_not_found(id: &DocumentId) -> Self {
        StoreError::NotFound {
            kind: "document",
            id: id.to_string(),
        }
    }

    pub fn record_not_found(id: &WorkflowId) -> Self {
        StoreError::NotFound {
            kind: "workflow record",
            id: id.to_string(),
        }
    }
}

/// Document store: free-form achievement payloads, soft-deleted only.
///
/// Soft-deleted documents are invisible to every read and write.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document; the store generates its id.
    async fn insert(&self, document: NewDocument) -> Result<DocumentRecord, StoreError>;

    async fn find(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, StoreError>;

    /// Overwrite the editable content, keeping attachments.
    async fn replace_content(
        &self,
        id: &DocumentId,
        content: AchievementContent,
    ) -> Result<DocumentRecord, StoreError>;

    async fn push_attachment(
        &self,
        id: &DocumentId,
        attachment: Attachment,
    ) -> Result<DocumentRecord, StoreError>;

    /// Set the soft-delete marker. Repeating it on a deleted document is a no-op.
    async fn soft_delete(&self, id: &DocumentId) -> Result<(), StoreError>;
}

/// Relational store: one lifecycle row per achievement.
///
/// List operations skip soft-deleted rows and return rows in insertion order.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn insert(&self, record: WorkflowRecord) -> Result<(), StoreError>;

    async fn find(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>, StoreError>;

    async fn find_by_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<WorkflowRecord>, StoreError>;

    /// Write the status and review columns, provided the stored row is still
    /// in `expected`. Otherwise nothing is written and `StatusConflict` carries
    /// the status found. The document reference is never rewritten.
    async fn update_status(
        &self,
        record: WorkflowRecord,
        expected: AchievementStatus,
    ) -> Result<(), StoreError>;

    /// Bump `updated_at` only, after a content change on the document side.
    async fn touch(&self, id: &WorkflowId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn soft_delete(&self, id: &WorkflowId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn list_all(&self) -> Result<Vec<WorkflowRecord>, StoreError>;

    async fn list_by_students(
        &self,
        students: Vec<UserId>,
    ) -> Result<Vec<WorkflowRecord>, StoreError>;
}
