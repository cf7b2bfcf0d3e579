use mojo_core::error::{ErrorCode, HasErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task '{0}' is already running")]
    AlreadyRunning(String),

    #[error("no executor registered for custom task key '{0}'")]
    UnknownCustomExecutor(String),

    /// `type=agent` executors are reserved per spec §4.5 — accepted as a
    /// valid task type but not yet runnable.
    #[error("agent task executor is reserved and not yet implemented")]
    AgentExecutorReserved,

    #[error("on-disk scheduler state at {path} is malformed: {reason}")]
    State { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HasErrorCode for SchedulerError {
    fn code(&self) -> ErrorCode {
        match self {
            SchedulerError::InvalidSchedule(_) => ErrorCode::ValidationError,
            SchedulerError::TaskNotFound(_) => ErrorCode::NotFoundError,
            SchedulerError::AlreadyRunning(_) => ErrorCode::ConflictError,
            SchedulerError::UnknownCustomExecutor(_) => ErrorCode::ValidationError,
            SchedulerError::AgentExecutorReserved => ErrorCode::NotFoundError,
            SchedulerError::State { .. } => ErrorCode::StateError,
            SchedulerError::Io(_) => ErrorCode::StateError,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            SchedulerError::TaskNotFound(id) => Some(serde_json::json!({ "task_id": id })),
            SchedulerError::AlreadyRunning(id) => Some(serde_json::json!({ "task_id": id })),
            SchedulerError::UnknownCustomExecutor(key) => Some(serde_json::json!({ "custom_key": key })),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
