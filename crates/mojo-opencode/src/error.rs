use mojo_core::error::{ErrorCode, HasErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenCodeError {
    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    #[error("project '{0}' is already running")]
    AlreadyRunning(String),

    #[error("sandbox '{name}' not found for project '{project}'")]
    SandboxNotFound { project: String, name: String },

    #[error("sandbox '{name}' already exists for project '{project}'")]
    SandboxAlreadyExists { project: String, name: String },

    #[error("refusing to delete the primary checkout")]
    CannotDeletePrimaryCheckout,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("deploy key at '{path}' is passphrase-protected: {reason}")]
    PassphraseProtectedKey { path: String, reason: String },

    #[error("operation '{operation}' timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("no free port available in the configured pool")]
    PortPoolExhausted,

    #[error("subprocess '{command}' failed: {reason}")]
    SubprocessFailed { command: String, reason: String },

    #[error("on-disk opencode state at {path} is malformed: {reason}")]
    State { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HasErrorCode for OpenCodeError {
    fn code(&self) -> ErrorCode {
        match self {
            OpenCodeError::ProjectNotFound(_) => ErrorCode::NotFoundError,
            OpenCodeError::SandboxNotFound { .. } => ErrorCode::NotFoundError,
            OpenCodeError::AlreadyRunning(_) => ErrorCode::ConflictError,
            OpenCodeError::SandboxAlreadyExists { .. } => ErrorCode::ConflictError,
            OpenCodeError::CannotDeletePrimaryCheckout => ErrorCode::ValidationError,
            OpenCodeError::Validation(_) => ErrorCode::ValidationError,
            OpenCodeError::PassphraseProtectedKey { .. } => ErrorCode::ValidationError,
            OpenCodeError::Timeout { .. } => ErrorCode::TimeoutError,
            OpenCodeError::PortPoolExhausted => ErrorCode::StateError,
            OpenCodeError::SubprocessFailed { .. } => ErrorCode::StateError,
            OpenCodeError::State { .. } => ErrorCode::StateError,
            OpenCodeError::Io(_) => ErrorCode::StateError,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            OpenCodeError::ProjectNotFound(git_url) => Some(serde_json::json!({ "git_url": git_url })),
            OpenCodeError::AlreadyRunning(git_url) => Some(serde_json::json!({ "git_url": git_url })),
            OpenCodeError::SandboxNotFound { project, name } => {
                Some(serde_json::json!({ "project": project, "name": name }))
            }
            OpenCodeError::SandboxAlreadyExists { project, name } => {
                Some(serde_json::json!({ "project": project, "name": name }))
            }
            OpenCodeError::Timeout { operation, timeout_secs } => {
                Some(serde_json::json!({ "operation": operation, "timeout_secs": timeout_secs }))
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OpenCodeError>;
