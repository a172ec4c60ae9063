// SQLite-backed store adapters
//
// `achievement_references` is the relational workflow table. The document
// store is a separate `achievement_documents` table holding JSON payloads; the
// reference column is a plain string, not a foreign key, since the two stores
// are independent systems.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{DocumentStore, StoreError, WorkflowStore};
use crate::achievements::{
    AchievementContent, AchievementStatus, Attachment, DocumentId, DocumentRecord, NewDocument,
    UserId, WorkflowId, WorkflowRecord,
};

const SELECT_LIVE_DOCUMENT: &str = r#"
    SELECT id, student_id, content, attachments, created_at, updated_at, deleted_at
    FROM achievement_documents
    WHERE id = ?1 AND deleted_at IS NULL
"#;

const RECORD_COLUMNS: &str = "id, student_id, document_id, status, submitted_at, submitted_by, \
     verified_at, verified_by, rejection_note, created_at, updated_at, deleted_at";

fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(column: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            column,
            reason: e.to_string(),
        })
}

fn decode_optional_time(
    column: &'static str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(|v| decode_time(column, &v)).transpose()
}

#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &SqliteRow) -> Result<DocumentRecord, StoreError> {
        let content: AchievementContent =
            serde_json::from_str(&row.try_get::<String, _>("content")?)?;
        let attachments: Vec<Attachment> =
            serde_json::from_str(&row.try_get::<String, _>("attachments")?)?;

        Ok(DocumentRecord {
            id: DocumentId(row.try_get("id")?),
            student_id: UserId(row.try_get("student_id")?),
            content,
            attachments,
            created_at: decode_time("created_at", &row.try_get::<String, _>("created_at")?)?,
            updated_at: decode_time("updated_at", &row.try_get::<String, _>("updated_at")?)?,
            deleted_at: decode_optional_time("deleted_at", row.try_get("deleted_at")?)?,
        })
    }

    async fn fetch_live(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        let row = sqlx::query(SELECT_LIVE_DOCUMENT)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::map_row).transpose()
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
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

        sqlx::query(
            r#"
            INSERT INTO achievement_documents
                (id, student_id, content, attachments, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.student_id.as_str())
        .bind(serde_json::to_string(&record.content)?)
        .bind(serde_json::to_string(&record.attachments)?)
        .bind(encode_time(&now))
        .bind(encode_time(&now))
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        self.fetch_live(id).await
    }

    async fn replace_content(
        &self,
        id: &DocumentId,
        content: AchievementContent,
    ) -> Result<DocumentRecord, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE achievement_documents
            SET content = ?1, updated_at = ?2
            WHERE id = ?3 AND deleted_at IS NULL
            "#,
        )
        .bind(serde_json::to_string(&content)?)
        .bind(encode_time(&Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::document_not_found(id));
        }

        self.fetch_live(id)
            .await?
            .ok_or_else(|| StoreError::document_not_found(id))
    }

    async fn push_attachment(
        &self,
        id: &DocumentId,
        attachment: Attachment,
    ) -> Result<DocumentRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(SELECT_LIVE_DOCUMENT)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::document_not_found(id))?;
        let mut doc = Self::map_row(&row)?;
        doc.attachments.push(attachment);
        doc.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE achievement_documents
            SET attachments = ?1, updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(serde_json::to_string(&doc.attachments)?)
        .bind(encode_time(&doc.updated_at))
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(doc)
    }

    async fn soft_delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE achievement_documents
            SET deleted_at = COALESCE(deleted_at, ?1)
            WHERE id = ?2
            "#,
        )
        .bind(encode_time(&Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::document_not_found(id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteWorkflowStore {
    pool: SqlitePool,
}

impl SqliteWorkflowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &SqliteRow) -> Result<WorkflowRecord, StoreError> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<AchievementStatus>()
            .map_err(|reason| StoreError::Corrupt {
                column: "status",
                reason,
            })?;

        Ok(WorkflowRecord {
            id: WorkflowId(row.try_get("id")?),
            student_id: UserId(row.try_get("student_id")?),
            document_id: DocumentId(row.try_get("document_id")?),
            status,
            submitted_at: decode_optional_time("submitted_at", row.try_get("submitted_at")?)?,
            submitted_by: row.try_get::<Option<String>, _>("submitted_by")?.map(UserId),
            verified_at: decode_optional_time("verified_at", row.try_get("verified_at")?)?,
            verified_by: row.try_get::<Option<String>, _>("verified_by")?.map(UserId),
            rejection_note: row.try_get("rejection_note")?,
            created_at: decode_time("created_at", &row.try_get::<String, _>("created_at")?)?,
            updated_at: decode_time("updated_at", &row.try_get::<String, _>("updated_at")?)?,
            deleted_at: decode_optional_time("deleted_at", row.try_get("deleted_at")?)?,
        })
    }

    fn map_rows(rows: Vec<SqliteRow>) -> Result<Vec<WorkflowRecord>, StoreError> {
        rows.iter().map(Self::map_row).collect()
    }
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn insert(&self, record: WorkflowRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO achievement_references
                (id, student_id, document_id, status, submitted_at, submitted_by,
                 verified_at, verified_by, rejection_note, created_at, updated_at, deleted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.student_id.as_str())
        .bind(record.document_id.as_str())
        .bind(record.status.as_str())
        .bind(record.submitted_at.as_ref().map(encode_time))
        .bind(record.submitted_by.as_ref().map(|id| id.as_str().to_string()))
        .bind(record.verified_at.as_ref().map(encode_time))
        .bind(record.verified_by.as_ref().map(|id| id.as_str().to_string()))
        .bind(record.rejection_note.as_deref())
        .bind(encode_time(&record.created_at))
        .bind(encode_time(&record.updated_at))
        .bind(record.deleted_at.as_ref().map(encode_time))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM achievement_references \
             WHERE id = ?1 AND deleted_at IS NULL"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_by_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<WorkflowRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM achievement_references \
             WHERE document_id = ?1 AND deleted_at IS NULL"
        ))
        .bind(document_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn update_status(
        &self,
        record: WorkflowRecord,
        expected: AchievementStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE achievement_references
            SET status = ?1, submitted_at = ?2, submitted_by = ?3, verified_at = ?4,
                verified_by = ?5, rejection_note = ?6, updated_at = ?7
            WHERE id = ?8 AND status = ?9 AND deleted_at IS NULL
            "#,
        )
        .bind(record.status.as_str())
        .bind(record.submitted_at.as_ref().map(encode_time))
        .bind(record.submitted_by.as_ref().map(|id| id.as_str().to_string()))
        .bind(record.verified_at.as_ref().map(encode_time))
        .bind(record.verified_by.as_ref().map(|id| id.as_str().to_string()))
        .bind(record.rejection_note.as_deref())
        .bind(encode_time(&record.updated_at))
        .bind(record.id.as_str())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.find(&record.id).await? {
                Some(current) => Err(StoreError::StatusConflict {
                    id: record.id.to_string(),
                    actual: current.status,
                }),
                None => Err(StoreError::record_not_found(&record.id)),
            };
        }
        Ok(())
    }

    async fn touch(&self, id: &WorkflowId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE achievement_references
            SET updated_at = ?1
            WHERE id = ?2 AND deleted_at IS NULL
            "#,
        )
        .bind(encode_time(&at))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::record_not_found(id));
        }
        Ok(())
    }

    async fn soft_delete(&self, id: &WorkflowId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE achievement_references
            SET deleted_at = ?1, updated_at = ?1
            WHERE id = ?2 AND deleted_at IS NULL
            "#,
        )
        .bind(encode_time(&at))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::record_not_found(id));
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<WorkflowRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM achievement_references \
             WHERE deleted_at IS NULL ORDER BY rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Self::map_rows(rows)
    }

    async fn list_by_students(
        &self,
        students: Vec<UserId>,
    ) -> Result<Vec<WorkflowRecord>, StoreError> {
        if students.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM achievement_references \
             WHERE deleted_at IS NULL AND student_id IN ("
        ));
        let mut separated = builder.separated(", ");
        for student in students {
            separated.push_bind(student.0);
        }
        separated.push_unseparated(") ORDER BY rowid ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Self::map_rows(rows)
    }
}
