// Achievement Workflow Library - student achievement lifecycle engine
// This exposes the core components for testing and integration

pub mod achievements;
pub mod config;
pub mod database;
pub mod external;
pub mod stores;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use achievements::{
    Achievement, AchievementContent, AchievementDetails, AchievementStatus, Attachment, Caller,
    DocumentId, DocumentRecord, Role, UserId, WorkflowId, WorkflowRecord,
};
pub use config::{config, init_config, AppConfig};
#[cfg(feature = "database")]
pub use database::DatabaseManager;
pub use external::{
    AdvisorDirectory, BlobStorage, CredentialStore, InMemoryBlobStorage, LocalBlobStorage,
    StaticDirectory,
};
pub use stores::{DocumentStore, InMemoryDocumentStore, InMemoryWorkflowStore, StoreError, WorkflowStore};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use workflows::{
    AchievementPage, AchievementStatistics, EngineSettings, HistoryEntry, ListQuery,
    NewAttachment, Scope, WorkflowEngine, WorkflowError, WorkflowEvent, WorkflowResult,
};
