use mojo_core::error::{ErrorCode, HasErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DreamingError {
    /// All four resilient-parse passes failed, per spec §4.4. No
    /// rule-based fallback beyond this.
    #[error("failed to parse {stage} output from {provider}/{model} as JSON after all recovery passes")]
    PipelineParse {
        provider: String,
        model: String,
        stage: String,
        raw_output: String,
    },

    #[error("invalid dreaming request: {0}")]
    Validation(String),

    #[error("archive not found: conversation={conversation_id} version={version:?}")]
    ArchiveNotFound {
        conversation_id: String,
        version: Option<u32>,
    },

    #[error("on-disk dreaming state at {path} is malformed: {reason}")]
    State { path: String, reason: String },

    #[error(transparent)]
    Llm(#[from] mojo_llm::LlmError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HasErrorCode for DreamingError {
    fn code(&self) -> ErrorCode {
        match self {
            DreamingError::PipelineParse { .. } => ErrorCode::PipelineParseError,
            DreamingError::Validation(_) => ErrorCode::ValidationError,
            DreamingError::ArchiveNotFound { .. } => ErrorCode::NotFoundError,
            DreamingError::State { .. } => ErrorCode::StateError,
            DreamingError::Io(_) => ErrorCode::StateError,
            DreamingError::Llm(e) => e.code(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            DreamingError::PipelineParse { provider, model, stage, .. } => {
                Some(serde_json::json!({ "provider": provider, "model": model, "stage": stage }))
            }
            DreamingError::ArchiveNotFound { conversation_id, version } => {
                Some(serde_json::json!({ "conversation_id": conversation_id, "version": version }))
            }
            DreamingError::Llm(e) => e.details(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DreamingError>;
