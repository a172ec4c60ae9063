//! Shared harness for achievement workflow integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use achievement_workflow::achievements::{
    AchievementContent, AchievementDetails, AchievementStatus, Caller, DocumentId, Role, UserId, WorkflowId,
    WorkflowRecord,
};
use achievement_workflow::external::{InMemoryBlobStorage, StaticDirectory};
use achievement_workflow::stores::{
    DocumentStore, InMemoryDocumentStore, InMemoryWorkflowStore, StoreError, WorkflowStore,
};
use achievement_workflow::workflows::WorkflowEngine;

/// Directory used by every harness:
/// s1, s2 -> advisor a1; s3 -> advisor a2; s4 has no advisor.
pub fn test_directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_user("student-one", "pw1", "s1", Role::Student)
        .with_user("student-two", "pw2", "s2", Role::Student)
        .with_user("student-three", "pw3", "s3", Role::Student)
        .with_user("student-four", "pw4", "s4", Role::Student)
        .with_user("advisor-one", "apw1", "a1", Role::Advisor)
        .with_user("advisor-two", "apw2", "a2", Role::Advisor)
        .with_user("root", "rootpw", "admin", Role::Admin)
        .with_advisor("s1", "a1")
        .with_advisor("s2", "a1")
        .with_advisor("s3", "a2")
}

pub struct Harness {
    pub engine: WorkflowEngine,
    pub documents: Arc<InMemoryDocumentStore>,
    pub records: Arc<FailingWorkflowStore>,
    pub directory: Arc<StaticDirectory>,
    pub blobs: Arc<InMemoryBlobStorage>,
}

impl Harness {
    pub fn new() -> Self {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let records = Arc::new(FailingWorkflowStore::new());
        let directory = Arc::new(test_directory());
        let blobs = Arc::new(InMemoryBlobStorage::new());

        let engine = WorkflowEngine::new(
            documents.clone(),
            records.clone(),
            directory.clone(),
            blobs.clone(),
        );

        Self {
            engine,
            documents,
            records,
            directory,
            blobs,
        }
    }

    /// Every live workflow record must point at a live document.
    pub async fn assert_live_records_have_documents(&self) {
        let live = self.records.inner.list_all().await.unwrap();
        for record in live {
            let document = self.documents.find(&record.document_id).await.unwrap();
            assert!(
                document.is_some(),
                "live record {} references missing document {}",
                record.id,
                record.document_id
            );
        }
    }

    pub async fn stored_record(&self, id: &WorkflowId) -> Option<WorkflowRecord> {
        self.records.inner.find(id).await.unwrap()
    }
}

pub fn student(id: &str) -> Caller {
    Caller::student(id)
}

pub fn advisor(id: &str) -> Caller {
    Caller::advisor(id)
}

pub fn admin() -> Caller {
    Caller::admin("admin")
}

pub fn sports_content(title: &str) -> AchievementContent {
    AchievementContent::new(title, AchievementDetails::opaque("sports"))
        .with_description("Inter-faculty futsal tournament")
        .with_tags(vec!["sports".to_string()])
}

pub fn competition_content(title: &str, level: &str) -> AchievementContent {
    let fields = json!({
        "competition_name": "National Programming Contest",
        "competition_level": level,
        "rank": 2,
    });
    let details = AchievementDetails::from_category(
        "competition",
        fields.as_object().cloned().unwrap_or_default(),
    )
    .unwrap();
    AchievementContent::new(title, details).with_points(50)
}

/// Relational store wrapper that can be told to fail inserts.
pub struct FailingWorkflowStore {
    pub inner: InMemoryWorkflowStore,
    fail_inserts: AtomicBool,
}

impl FailingWorkflowStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryWorkflowStore::new(),
            fail_inserts: AtomicBool::new(false),
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkflowStore for FailingWorkflowStore {
    async fn insert(&self, record: WorkflowRecord) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("relational store unavailable".to_string()));
        }
        self.inner.insert(record).await
    }

    async fn find(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>, StoreError> {
        self.inner.find(id).await
    }

    async fn find_by_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<WorkflowRecord>, StoreError> {
        self.inner.find_by_document(document_id).await
    }

    async fn update_status(
        &self,
        record: WorkflowRecord,
        expected: AchievementStatus,
    ) -> Result<(), StoreError> {
        self.inner.update_status(record, expected).await
    }

    async fn touch(&self, id: &WorkflowId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.touch(id, at).await
    }

    async fn soft_delete(&self, id: &WorkflowId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.soft_delete(id, at).await
    }

    async fn list_all(&self) -> Result<Vec<WorkflowRecord>, StoreError> {
        self.inner.list_all().await
    }

    async fn list_by_students(
        &self,
        students: Vec<UserId>,
    ) -> Result<Vec<WorkflowRecord>, StoreError> {
        self.inner.list_by_students(students).await
    }
}
