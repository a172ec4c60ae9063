// Achievement workflow: lifecycle state machine, authorization and the
// engine that drives both stores.

pub mod engine;
pub mod errors;
pub mod guard;
pub mod history;
pub mod state_machine;
pub mod statistics;

pub use engine::{AchievementPage, EngineSettings, ListQuery, NewAttachment, Scope, WorkflowEngine};
pub use errors::{WorkflowError, WorkflowResult};
pub use guard::{AuthorizationGuard, Decision};
pub use history::{timeline, HistoryEntry};
pub use state_machine::{allowed_events, successors, transition, TransitionOutcome, WorkflowEvent};
pub use statistics::{
    AchievementStatistics, CategoryStatistic, CompetitionLevelStatistic, PeriodStatistic,
    StatisticsSummary, StudentRanking,
};
