// Achievement workflow engine
//
// Orchestrates the authorization guard, the state machine and the two
// stores. Every store and directory call is bounded by the configured
// timeout; creation compensates a failed record insert by soft-deleting the
// document it just wrote.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

use super::errors::{WorkflowError, WorkflowResult};
use super::guard::{AuthorizationGuard, Decision};
use super::history::{timeline, HistoryEntry};
use super::state_machine::{transition, TransitionOutcome, WorkflowEvent};
use super::statistics::AchievementStatistics;
use crate::achievements::{
    Achievement, AchievementContent, AchievementStatus, Attachment, Caller, DocumentRecord,
    NewDocument, Role, WorkflowId, WorkflowRecord,
};
use crate::external::{guess_content_type, AdvisorDirectory, BlobStorage};
use crate::stores::{DocumentStore, StoreError, WorkflowStore};
use crate::telemetry::{create_workflow_span, generate_correlation_id};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound for any single store or directory call
    pub store_timeout: Duration,
    pub top_students: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(10_000),
            top_students: 10,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

/// Which achievements a listing or statistics call covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every live achievement; admins only.
    All,
    /// The calling student's own achievements.
    Own,
    /// Achievements of the calling advisor's current advisees.
    Advisees,
}

impl Scope {
    pub fn for_caller(caller: &Caller) -> Self {
        match caller.role {
            Role::Admin => Scope::All,
            Role::Student => Scope::Own,
            Role::Advisor => Scope::Advisees,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::All => "all",
            Scope::Own => "own",
            Scope::Advisees => "advisees",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub status: Option<AchievementStatus>,
    /// 1-based; 0 is treated as 1
    pub page: usize,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementPage {
    pub items: Vec<Achievement>,
    /// Matching records before pagination
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Attachment upload as received from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct WorkflowEngine {
    documents: Arc<dyn DocumentStore>,
    records: Arc<dyn WorkflowStore>,
    directory: Arc<dyn AdvisorDirectory>,
    blobs: Arc<dyn BlobStorage>,
    guard: AuthorizationGuard,
    settings: EngineSettings,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Target status for a status-changing event.
fn target_status(from: AchievementStatus, event: WorkflowEvent) -> WorkflowResult<AchievementStatus> {
    match transition(from, event)? {
        TransitionOutcome::Status(to) => Ok(to),
        TransitionOutcome::Removed => Err(WorkflowError::InvalidTransition { from, event }),
    }
}

impl WorkflowEngine {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        records: Arc<dyn WorkflowStore>,
        directory: Arc<dyn AdvisorDirectory>,
        blobs: Arc<dyn BlobStorage>,
    ) -> Self {
        Self {
            documents,
            records,
            guard: AuthorizationGuard::new(directory.clone()),
            directory,
            blobs,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Create a draft achievement owned by the calling student.
    pub async fn create(
        &self,
        caller: &Caller,
        content: AchievementContent,
    ) -> WorkflowResult<Achievement> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("create", None, caller, &correlation_id);

        async move {
            self.authorize(caller, None, WorkflowEvent::Create).await?;
            if caller.role != Role::Student {
                return Err(WorkflowError::forbidden(
                    "only students can own achievements",
                ));
            }
            content.validate().map_err(WorkflowError::Validation)?;

            let document = self
                .bounded(
                    "document.insert",
                    self.documents.insert(NewDocument {
                        student_id: caller.identity.clone(),
                        content,
                    }),
                )
                .await?;

            let record = WorkflowRecord::new_draft(
                caller.identity.clone(),
                document.id.clone(),
                Utc::now(),
            );

            if let Err(err) = self
                .bounded("record.insert", self.records.insert(record.clone()))
                .await
            {
                self.compensate_create(&record, &document, &err).await;
                return Err(err);
            }

            info!(
                workflow_id = %record.id,
                document_id = %document.id,
                category = document.content.category(),
                "Achievement created"
            );
            Ok(Achievement { record, document })
        }
        .instrument(span)
        .await
    }

    pub async fn get(&self, caller: &Caller, id: &WorkflowId) -> WorkflowResult<Achievement> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("get", Some(id.as_str()), caller, &correlation_id);

        async move {
            let record = self.load_record(id).await?;
            self.authorize(caller, Some(&record), WorkflowEvent::Read)
                .await?;
            let document = self.load_document(&record).await?;
            debug!(status = %record.status, "Achievement loaded");
            Ok(Achievement { record, document })
        }
        .instrument(span)
        .await
    }

    /// Page through the achievements visible in `scope`.
    ///
    /// Records whose document is missing are skipped, not failed.
    pub async fn list(
        &self,
        caller: &Caller,
        scope: Scope,
        query: ListQuery,
    ) -> WorkflowResult<AchievementPage> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("list", None, caller, &correlation_id);

        async move {
            let records = self.scoped_records(caller, scope).await?;
            let matching: Vec<WorkflowRecord> = records
                .into_iter()
                .filter(|record| query.status.map_or(true, |status| record.status == status))
                .collect();

            let page = query.page.max(1);
            let page_size = self.page_size(query.page_size);
            let total = matching.len();
            let offset = (page - 1).saturating_mul(page_size);

            let mut items = Vec::new();
            for record in matching.into_iter().skip(offset).take(page_size) {
                match self
                    .bounded("document.find", self.documents.find(&record.document_id))
                    .await?
                {
                    Some(document) => items.push(Achievement { record, document }),
                    None => warn!(
                        workflow_id = %record.id,
                        document_id = %record.document_id,
                        "Skipping achievement with missing document"
                    ),
                }
            }

            debug!(%scope, total, returned = items.len(), "Achievements listed");
            Ok(AchievementPage {
                items,
                total,
                page,
                page_size,
                total_pages: total.div_ceil(page_size),
            })
        }
        .instrument(span)
        .await
    }

    /// Overwrite the content of a draft.
    pub async fn update(
        &self,
        caller: &Caller,
        id: &WorkflowId,
        content: AchievementContent,
    ) -> WorkflowResult<Achievement> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("update", Some(id.as_str()), caller, &correlation_id);

        async move {
            let record = self.load_record(id).await?;
            self.authorize(caller, Some(&record), WorkflowEvent::Update)
                .await?;
            transition(record.status, WorkflowEvent::Update)?;
            content.validate().map_err(WorkflowError::Validation)?;

            let document = self
                .bounded(
                    "document.replace_content",
                    self.documents.replace_content(&record.document_id, content),
                )
                .await?;

            let record = self.touch_record(&record.id).await?;

            info!(workflow_id = %record.id, "Achievement updated");
            Ok(Achievement { record, document })
        }
        .instrument(span)
        .await
    }

    /// Soft-delete a draft from both stores.
    ///
    /// The workflow record goes first so a live record never points at a
    /// deleted document. If the document delete then fails, the record stays
    /// deleted and the document error is returned.
    pub async fn delete(&self, caller: &Caller, id: &WorkflowId) -> WorkflowResult<()> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("delete", Some(id.as_str()), caller, &correlation_id);

        async move {
            let record = self.load_record(id).await?;
            self.authorize(caller, Some(&record), WorkflowEvent::Delete)
                .await?;
            transition(record.status, WorkflowEvent::Delete)?;

            self.bounded(
                "record.soft_delete",
                self.records.soft_delete(&record.id, Utc::now()),
            )
            .await?;

            self.bounded(
                "document.soft_delete",
                self.documents.soft_delete(&record.document_id),
            )
            .await
            .inspect_err(|err| {
                warn!(
                    workflow_id = %record.id,
                    document_id = %record.document_id,
                    error = %err,
                    "Workflow record deleted but document delete failed; document is orphaned"
                )
            })?;

            info!(workflow_id = %record.id, "Achievement deleted");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Submit a draft, or resubmit a rejected achievement.
    pub async fn submit(&self, caller: &Caller, id: &WorkflowId) -> WorkflowResult<WorkflowRecord> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("submit", Some(id.as_str()), caller, &correlation_id);

        async move {
            let mut record = self.load_record(id).await?;
            self.authorize(caller, Some(&record), WorkflowEvent::Submit)
                .await?;
            let from = record.status;
            let to = target_status(from, WorkflowEvent::Submit)?;

            let now = Utc::now();
            record.status = to;
            record.submitted_at = Some(now);
            record.submitted_by = Some(caller.identity.clone());
            record.updated_at = now;
            if from == AchievementStatus::Rejected {
                record.verified_at = None;
                record.verified_by = None;
                record.rejection_note = None;
            }

            self.save_transition(record, from, WorkflowEvent::Submit, caller)
                .await
        }
        .instrument(span)
        .await
    }

    pub async fn verify(&self, caller: &Caller, id: &WorkflowId) -> WorkflowResult<WorkflowRecord> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("verify", Some(id.as_str()), caller, &correlation_id);

        self.review(caller, id, WorkflowEvent::Verify, None)
            .instrument(span)
            .await
    }

    /// Reject a submitted achievement. The note is required.
    pub async fn reject(
        &self,
        caller: &Caller,
        id: &WorkflowId,
        note: &str,
    ) -> WorkflowResult<WorkflowRecord> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("reject", Some(id.as_str()), caller, &correlation_id);

        self.review(caller, id, WorkflowEvent::Reject, Some(note))
            .instrument(span)
            .await
    }

    pub async fn history(
        &self,
        caller: &Caller,
        id: &WorkflowId,
    ) -> WorkflowResult<Vec<HistoryEntry>> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("history", Some(id.as_str()), caller, &correlation_id);

        async move {
            let record = self.load_record(id).await?;
            self.authorize(caller, Some(&record), WorkflowEvent::Read)
                .await?;
            Ok(timeline(&record))
        }
        .instrument(span)
        .await
    }

    pub async fn statistics(
        &self,
        caller: &Caller,
        scope: Scope,
    ) -> WorkflowResult<AchievementStatistics> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("statistics", None, caller, &correlation_id);

        async move {
            let records = self.scoped_records(caller, scope).await?;

            let mut entries: Vec<(WorkflowRecord, Option<DocumentRecord>)> =
                Vec::with_capacity(records.len());
            for record in records {
                let document = self
                    .bounded("document.find", self.documents.find(&record.document_id))
                    .await?;
                if document.is_none() {
                    warn!(
                        workflow_id = %record.id,
                        document_id = %record.document_id,
                        "Document missing; counting record without category details"
                    );
                }
                entries.push((record, document));
            }

            let statistics = AchievementStatistics::compute(&entries, self.settings.top_students);
            debug!(%scope, total = statistics.summary.total, "Statistics computed");
            Ok(statistics)
        }
        .instrument(span)
        .await
    }

    /// Store an attachment blob and append it to a draft's document.
    pub async fn add_attachment(
        &self,
        caller: &Caller,
        id: &WorkflowId,
        upload: NewAttachment,
    ) -> WorkflowResult<Achievement> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("add_attachment", Some(id.as_str()), caller, &correlation_id);

        async move {
            let record = self.load_record(id).await?;
            self.authorize(caller, Some(&record), WorkflowEvent::AddAttachment)
                .await?;
            transition(record.status, WorkflowEvent::AddAttachment)?;

            if upload.bytes.is_empty() {
                return Err(WorkflowError::Validation("attachment is empty".to_string()));
            }

            let file_type = upload
                .content_type
                .filter(|content_type| !content_type.trim().is_empty())
                .unwrap_or_else(|| guess_content_type(&upload.file_name).to_string());
            let size = upload.bytes.len();

            let file_url = self
                .bounded("blob.store", self.blobs.store(upload.bytes, &upload.file_name))
                .await?;

            let attachment = Attachment {
                file_name: upload.file_name,
                file_url: file_url.clone(),
                file_type,
                uploaded_at: Utc::now(),
            };
            let document = self
                .bounded(
                    "document.push_attachment",
                    self.documents
                        .push_attachment(&record.document_id, attachment),
                )
                .await
                .inspect_err(|err| {
                    warn!(
                        workflow_id = %record.id,
                        document_id = %record.document_id,
                        file_url = %file_url,
                        error = %err,
                        "Attachment stored but not linked; blob is orphaned"
                    )
                })?;

            let record = self.touch_record(&record.id).await?;

            info!(
                workflow_id = %record.id,
                attachments = document.attachments.len(),
                size,
                "Attachment added"
            );
            Ok(Achievement { record, document })
        }
        .instrument(span)
        .await
    }

    /// Requested page size, or the default when absent or out of range.
    fn page_size(&self, requested: Option<usize>) -> usize {
        let max = self.settings.max_page_size.max(1);
        match requested {
            Some(size) if (1..=max).contains(&size) => size,
            _ => self.settings.default_page_size.clamp(1, max),
        }
    }

    async fn review(
        &self,
        caller: &Caller,
        id: &WorkflowId,
        event: WorkflowEvent,
        note: Option<&str>,
    ) -> WorkflowResult<WorkflowRecord> {
        let mut record = self.load_record(id).await?;
        self.authorize(caller, Some(&record), event).await?;
        let from = record.status;
        let to = target_status(from, event)?;

        let rejection_note = match event {
            WorkflowEvent::Reject => {
                let note = note.map(str::trim).unwrap_or_default();
                if note.is_empty() {
                    return Err(WorkflowError::Validation(
                        "a rejection note is required".to_string(),
                    ));
                }
                Some(note.to_string())
            }
            _ => None,
        };

        let now = Utc::now();
        record.status = to;
        record.verified_at = Some(now);
        record.verified_by = Some(caller.identity.clone());
        record.rejection_note = rejection_note;
        record.updated_at = now;

        self.save_transition(record, from, event, caller).await
    }

    /// Persist a status change, provided no other call moved the record off
    /// `from` since it was loaded.
    async fn save_transition(
        &self,
        record: WorkflowRecord,
        from: AchievementStatus,
        event: WorkflowEvent,
        caller: &Caller,
    ) -> WorkflowResult<WorkflowRecord> {
        let write = async {
            self.records
                .update_status(record.clone(), from)
                .await
                .map_err(|err| match err {
                    StoreError::StatusConflict { actual, .. } => {
                        WorkflowError::InvalidTransition { from: actual, event }
                    }
                    other => other.into(),
                })
        };
        self.bounded("record.update", write).await?;

        info!(
            workflow_id = %record.id,
            from = %from,
            to = %record.status,
            actor = %caller.identity,
            "Achievement status transition"
        );
        Ok(record)
    }

    /// Bump `updated_at` after a document-side change and return the current row.
    async fn touch_record(&self, id: &WorkflowId) -> WorkflowResult<WorkflowRecord> {
        self.bounded("record.touch", self.records.touch(id, Utc::now()))
            .await?;
        self.load_record(id).await
    }

    async fn compensate_create(
        &self,
        record: &WorkflowRecord,
        document: &DocumentRecord,
        cause: &WorkflowError,
    ) {
        warn!(
            document_id = %document.id,
            error = %cause,
            "Workflow record insert failed, rolling back document"
        );

        // A timed-out insert may still have landed.
        if matches!(cause, WorkflowError::StorageTimeout { .. }) {
            match self
                .bounded(
                    "record.soft_delete",
                    self.records.soft_delete(&record.id, Utc::now()),
                )
                .await
            {
                Ok(()) | Err(WorkflowError::NotFound { .. }) => {}
                Err(err) => error!(
                    workflow_id = %record.id,
                    error = %err,
                    "Failed to remove possibly inserted workflow record"
                ),
            }
        }

        if let Err(err) = self
            .bounded(
                "document.soft_delete",
                self.documents.soft_delete(&document.id),
            )
            .await
        {
            error!(
                document_id = %document.id,
                error = %err,
                "Compensation failed; achievement document is orphaned"
            );
        }
    }

    async fn scoped_records(
        &self,
        caller: &Caller,
        scope: Scope,
    ) -> WorkflowResult<Vec<WorkflowRecord>> {
        match (scope, caller.role) {
            (Scope::All, Role::Admin) => self.bounded("record.list_all", self.records.list_all()).await,
            (Scope::Own, Role::Student) => {
                self.bounded(
                    "record.list_by_students",
                    self.records.list_by_students(vec![caller.identity.clone()]),
                )
                .await
            }
            (Scope::Advisees, Role::Advisor) => {
                let advisees = self
                    .bounded("directory.advisees", self.directory.advisees(&caller.identity))
                    .await?;
                if advisees.is_empty() {
                    return Ok(Vec::new());
                }
                self.bounded(
                    "record.list_by_students",
                    self.records.list_by_students(advisees),
                )
                .await
            }
            (scope, role) => Err(WorkflowError::forbidden(format!(
                "{role} callers cannot use the {scope} scope"
            ))),
        }
    }

    async fn load_record(&self, id: &WorkflowId) -> WorkflowResult<WorkflowRecord> {
        self.bounded("record.find", self.records.find(id))
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "achievement",
                id: id.to_string(),
            })
    }

    async fn load_document(&self, record: &WorkflowRecord) -> WorkflowResult<DocumentRecord> {
        self.bounded("document.find", self.documents.find(&record.document_id))
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "achievement document",
                id: record.document_id.to_string(),
            })
    }

    async fn authorize(
        &self,
        caller: &Caller,
        record: Option<&WorkflowRecord>,
        event: WorkflowEvent,
    ) -> WorkflowResult<()> {
        let decision = self
            .bounded(
                "directory.authorize",
                self.guard.can_transition(caller, record, event),
            )
            .await?;

        match decision {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                warn!(
                    caller = %caller.identity,
                    role = %caller.role,
                    event = %event,
                    reason = %reason,
                    "Authorization denied"
                );
                Err(WorkflowError::forbidden(reason))
            }
        }
    }

    async fn bounded<T, E, F>(&self, operation: &'static str, call: F) -> WorkflowResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<WorkflowError>,
    {
        match tokio::time::timeout(self.settings.store_timeout, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                let timeout_ms = u64::try_from(self.settings.store_timeout.as_millis())
                    .unwrap_or(u64::MAX);
                warn!(operation, timeout_ms, "Store call timed out");
                Err(WorkflowError::StorageTimeout {
                    operation: operation.to_string(),
                    timeout_ms,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::{AchievementDetails, UserId};
    use crate::external::{InMemoryBlobStorage, StaticDirectory};
    use crate::stores::{
        InMemoryDocumentStore, InMemoryWorkflowStore, MockDocumentStore, MockWorkflowStore,
        StoreError,
    };
    use async_trait::async_trait;

    fn content() -> AchievementContent {
        AchievementContent::new("Hackathon finalist", AchievementDetails::opaque("sports"))
    }

    fn directory() -> Arc<StaticDirectory> {
        Arc::new(StaticDirectory::new().with_advisor("s1", "a1"))
    }

    fn engine_with(
        documents: Arc<dyn DocumentStore>,
        records: Arc<dyn WorkflowStore>,
    ) -> WorkflowEngine {
        WorkflowEngine::new(
            documents,
            records,
            directory(),
            Arc::new(InMemoryBlobStorage::new()),
        )
    }

    /// Delays every call far beyond the engine timeout.
    struct StalledWorkflowStore {
        inner: InMemoryWorkflowStore,
    }

    #[async_trait]
    impl WorkflowStore for StalledWorkflowStore {
        async fn insert(&self, record: WorkflowRecord) -> Result<(), StoreError> {
            self.inner.insert(record).await
        }

        async fn find(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>, StoreError> {
            self.inner.find(id).await
        }

        async fn find_by_document(
            &self,
            document_id: &crate::achievements::DocumentId,
        ) -> Result<Option<WorkflowRecord>, StoreError> {
            self.inner.find_by_document(document_id).await
        }

        async fn update_status(
            &self,
            record: WorkflowRecord,
            expected: AchievementStatus,
        ) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.inner.update_status(record, expected).await
        }

        async fn touch(
            &self,
            id: &WorkflowId,
            at: chrono::DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.touch(id, at).await
        }

        async fn soft_delete(
            &self,
            id: &WorkflowId,
            at: chrono::DateTime<Utc>,
        ) -> Result<(), StoreError> {
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

    #[tokio::test]
    async fn test_failed_record_insert_soft_deletes_document() {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let mut records = MockWorkflowStore::new();
        records
            .expect_insert()
            .times(1)
            .returning(|_| Err(StoreError::Backend("connection reset".to_string())));
        records.expect_soft_delete().never();

        let engine = engine_with(documents.clone(), Arc::new(records));
        let result = engine.create(&Caller::student("s1"), content()).await;

        assert!(matches!(result, Err(WorkflowError::Storage(_))));
        assert_eq!(documents.len().await, 1);
        let all = documents.all_including_deleted().await;
        assert!(all.iter().all(|doc| !doc.is_live()));
    }

    #[tokio::test]
    async fn test_failed_compensation_still_reports_storage_error() {
        let mut documents = MockDocumentStore::new();
        documents.expect_insert().returning(|new| {
            Ok(DocumentRecord {
                id: crate::achievements::DocumentId::from("doc-1"),
                student_id: new.student_id,
                content: new.content,
                attachments: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                deleted_at: None,
            })
        });
        documents
            .expect_soft_delete()
            .times(1)
            .returning(|_| Err(StoreError::Backend("document store down".to_string())));

        let mut records = MockWorkflowStore::new();
        records
            .expect_insert()
            .returning(|_| Err(StoreError::Backend("relational store down".to_string())));

        let engine = engine_with(Arc::new(documents), Arc::new(records));
        let result = engine.create(&Caller::student("s1"), content()).await;

        match result {
            Err(WorkflowError::Storage(message)) => assert!(message.contains("relational")),
            other => panic!("expected storage error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_leaves_record_unchanged() {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let records = Arc::new(StalledWorkflowStore {
            inner: InMemoryWorkflowStore::new(),
        });
        let engine = engine_with(documents, records.clone()).with_settings(EngineSettings {
            store_timeout: Duration::from_millis(500),
            ..EngineSettings::default()
        });

        let student = Caller::student("s1");
        let created = engine.create(&student, content()).await.unwrap();

        let result = engine.submit(&student, created.id()).await;
        match result {
            Err(WorkflowError::StorageTimeout { operation, timeout_ms }) => {
                assert_eq!(operation, "record.update");
                assert_eq!(timeout_ms, 500);
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        let stored = records.inner.find(created.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, AchievementStatus::Draft);
        assert!(stored.submitted_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_document_failure() {
        let records = Arc::new(InMemoryWorkflowStore::new());
        let inner_documents = Arc::new(InMemoryDocumentStore::new());

        let student = Caller::student("s1");
        let setup = engine_with(inner_documents.clone(), records.clone());
        let created = setup.create(&student, content()).await.unwrap();

        let mut documents = MockDocumentStore::new();
        documents
            .expect_soft_delete()
            .returning(|_| Err(StoreError::Backend("unavailable".to_string())));
        let engine = engine_with(Arc::new(documents), records.clone());

        let result = engine.delete(&student, created.id()).await;
        assert!(matches!(result, Err(WorkflowError::Storage(_))));

        // the record delete already committed
        assert!(records.find(created.id()).await.unwrap().is_none());
        assert!(records.find_including_deleted(created.id()).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_attachment_link_keeps_record_untouched() {
        let records = Arc::new(InMemoryWorkflowStore::new());
        let student = Caller::student("s1");
        let setup = engine_with(Arc::new(InMemoryDocumentStore::new()), records.clone());
        let created = setup.create(&student, content()).await.unwrap();

        let mut documents = MockDocumentStore::new();
        documents
            .expect_push_attachment()
            .times(1)
            .returning(|_, _| Err(StoreError::Backend("document store down".to_string())));
        let blobs = Arc::new(InMemoryBlobStorage::new());
        let engine = WorkflowEngine::new(
            Arc::new(documents),
            records.clone(),
            directory(),
            blobs.clone(),
        );

        let result = engine
            .add_attachment(
                &student,
                created.id(),
                NewAttachment {
                    file_name: "proof.pdf".to_string(),
                    content_type: None,
                    bytes: b"%PDF".to_vec(),
                },
            )
            .await;
        assert!(matches!(result, Err(WorkflowError::Storage(_))));

        let stored = records.find(created.id()).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, created.record.updated_at);
        assert_eq!(blobs.len().await, 1);
    }

    #[tokio::test]
    async fn test_forbidden_wins_over_invalid_transition() {
        let engine = engine_with(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryWorkflowStore::new()),
        );
        let created = engine
            .create(&Caller::student("s1"), content())
            .await
            .unwrap();

        // draft cannot be verified, but the stranger is rejected first
        let result = engine.verify(&Caller::advisor("a2"), created.id()).await;
        assert!(matches!(result, Err(WorkflowError::Forbidden { .. })));

        let result = engine.verify(&Caller::advisor("a1"), created.id()).await;
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidTransition {
                from: AchievementStatus::Draft,
                event: WorkflowEvent::Verify
            })
        ));
    }

    #[tokio::test]
    async fn test_blank_rejection_note_is_invalid() {
        let engine = engine_with(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryWorkflowStore::new()),
        );
        let student = Caller::student("s1");
        let created = engine.create(&student, content()).await.unwrap();
        engine.submit(&student, created.id()).await.unwrap();

        let result = engine
            .reject(&Caller::advisor("a1"), created.id(), "   ")
            .await;
        assert!(matches!(result, Err(WorkflowError::Validation(_))));

        let achievement = engine.get(&student, created.id()).await.unwrap();
        assert_eq!(achievement.status(), AchievementStatus::Submitted);
    }

    #[test]
    fn test_scope_for_caller() {
        assert_eq!(Scope::for_caller(&Caller::admin("x")), Scope::All);
        assert_eq!(Scope::for_caller(&Caller::student("x")), Scope::Own);
        assert_eq!(Scope::for_caller(&Caller::advisor("x")), Scope::Advisees);
    }
}
