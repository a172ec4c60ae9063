use thiserror::Error;

use super::state_machine::WorkflowEvent;
use crate::achievements::AchievementStatus;
use crate::external::{BlobError, DirectoryError};
use crate::stores::StoreError;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors surfaced by the workflow engine to the boundary layer.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Invalid transition: cannot {event} an achievement that is {from}")]
    InvalidTransition {
        from: AchievementStatus,
        event: WorkflowEvent,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage timeout: {operation} exceeded {timeout_ms}ms")]
    StorageTimeout { operation: String, timeout_ms: u64 },

    #[error("Invalid credentials")]
    InvalidCredentials,
}

impl WorkflowError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        WorkflowError::Forbidden {
            reason: reason.into(),
        }
    }

    /// HTTP-equivalent status code for transport layers.
    pub fn status_code(&self) -> u16 {
        match self {
            WorkflowError::Validation(_) => 400,
            WorkflowError::InvalidCredentials => 401,
            WorkflowError::Forbidden { .. } => 403,
            WorkflowError::NotFound { .. } => 404,
            WorkflowError::InvalidTransition { .. } => 409,
            WorkflowError::Storage(_) => 500,
            WorkflowError::StorageTimeout { .. } => 504,
        }
    }

    /// Whether the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => WorkflowError::NotFound { kind, id },
            other => WorkflowError::Storage(other.to_string()),
        }
    }
}

impl From<DirectoryError> for WorkflowError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidCredentials => WorkflowError::InvalidCredentials,
            other => WorkflowError::Storage(other.to_string()),
        }
    }
}

impl From<BlobError> for WorkflowError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidFileName(name) => {
                WorkflowError::Validation(format!("invalid attachment file name: {name}"))
            }
            other => WorkflowError::Storage(other.to_string()),
        }
    }
}
