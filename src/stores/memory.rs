// In-memory store adapters
//
// Used by tests and by the binary when the `database` feature is off. Every
// method takes the lock once, so each call is a single atomic write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{DocumentStore, StoreError, WorkflowStore};
use crate::achievements::{
    AchievementContent, AchievementStatus, Attachment, DocumentId, DocumentRecord, NewDocument,
    UserId, WorkflowId, WorkflowRecord,
};

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, DocumentRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw lookup that also returns soft-deleted documents.
    pub async fn find_including_deleted(&self, id: &DocumentId) -> Option<DocumentRecord> {
        self.documents.read().await.get(id).cloned()
    }

    /// Every stored document, soft-deleted ones included.
    pub async fn all_including_deleted(&self) -> Vec<DocumentRecord> {
        self.documents.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, document: NewDocument) -> Result<DocumentRecord, StoreError> {
        let now = Utc::now();
        let record = DocumentRecord {
            id: DocumentId::generate(),
            student_id: document.student_id,
            content: document.content,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.documents
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self
            .documents
            .read()
            .await
            .get(id)
            .filter(|doc| doc.is_live())
            .cloned())
    }

    async fn replace_content(
        &self,
        id: &DocumentId,
        content: AchievementContent,
    ) -> Result<DocumentRecord, StoreError> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(id)
            .filter(|doc| doc.is_live())
            .ok_or_else(|| StoreError::document_not_found(id))?;

        doc.content = content;
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    async fn push_attachment(
        &self,
        id: &DocumentId,
        attachment: Attachment,
    ) -> Result<DocumentRecord, StoreError> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(id)
            .filter(|doc| doc.is_live())
            .ok_or_else(|| StoreError::document_not_found(id))?;

        doc.attachments.push(attachment);
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    async fn soft_delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(id)
            .ok_or_else(|| StoreError::document_not_found(id))?;

        if doc.deleted_at.is_none() {
            doc.deleted_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    // Vec keeps insertion order for listings.
    records: RwLock<Vec<WorkflowRecord>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw lookup that also returns soft-deleted rows.
    pub async fn find_including_deleted(&self, id: &WorkflowId) -> Option<WorkflowRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| &record.id == id)
            .cloned()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn insert(&self, record: WorkflowRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.iter().any(|existing| existing.id == record.id) {
            return Err(StoreError::Backend(format!(
                "duplicate workflow id: {}",
                record.id
            )));
        }
        records.push(record);
        Ok(())
    }

    async fn find(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|record| &record.id == id && record.is_live())
            .cloned())
    }

    async fn find_by_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<WorkflowRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|record| &record.document_id == document_id && record.is_live())
            .cloned())
    }

    async fn update_status(
        &self,
        record: WorkflowRecord,
        expected: AchievementStatus,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let existing = records
            .iter_mut()
            .find(|existing| existing.id == record.id && existing.is_live())
            .ok_or_else(|| StoreError::record_not_found(&record.id))?;

        if existing.status != expected {
            return Err(StoreError::StatusConflict {
                id: record.id.to_string(),
                actual: existing.status,
            });
        }

        existing.status = record.status;
        existing.submitted_at = record.submitted_at;
        existing.submitted_by = record.submitted_by;
        existing.verified_at = record.verified_at;
        existing.verified_by = record.verified_by;
        existing.rejection_note = record.rejection_note;
        existing.updated_at = record.updated_at;
        Ok(())
    }

    async fn touch(&self, id: &WorkflowId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let existing = records
            .iter_mut()
            .find(|existing| &existing.id == id && existing.is_live())
            .ok_or_else(|| StoreError::record_not_found(id))?;

        existing.updated_at = at;
        Ok(())
    }

    async fn soft_delete(&self, id: &WorkflowId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let existing = records
            .iter_mut()
            .find(|existing| &existing.id == id && existing.is_live())
            .ok_or_else(|| StoreError::record_not_found(id))?;

        existing.deleted_at = Some(at);
        existing.updated_at = at;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<WorkflowRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.is_live())
            .cloned()
            .collect())
    }

    async fn list_by_students(
        &self,
        students: Vec<UserId>,
    ) -> Result<Vec<WorkflowRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.is_live() && students.contains(&record.student_id))
            .cloned()
            .collect())
    }
}
