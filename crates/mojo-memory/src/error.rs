use mojo_core::error::{ErrorCode, HasErrorCode};
use thiserror::Error;

/// Mirrors `MemoryError` in the teacher's `skynet-memory/src/error.rs`,
/// extended with the dimension/backend/degraded variants this spec's
/// multi-model ranking requires.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("conversation page '{0}' not found")]
    PageNotFound(String),

    #[error("message index {index} out of range for page '{page_id}'")]
    MessageIndexOutOfRange { page_id: String, index: usize },

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("embedding backend failed while writing: {0}")]
    Embedding(#[from] mojo_embedding::EmbeddingError),

    #[error("invalid memory operation: {0}")]
    Validation(String),

    #[error("on-disk memory state at {path} is malformed: {reason}")]
    State { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HasErrorCode for MemoryError {
    fn code(&self) -> ErrorCode {
        match self {
            MemoryError::PageNotFound(_) => ErrorCode::NotFoundError,
            MemoryError::DocumentNotFound(_) => ErrorCode::NotFoundError,
            MemoryError::MessageIndexOutOfRange { .. } => ErrorCode::ValidationError,
            MemoryError::Embedding(e) => e.code(),
            MemoryError::Validation(_) => ErrorCode::ValidationError,
            MemoryError::State { .. } => ErrorCode::StateError,
            MemoryError::Io(_) => ErrorCode::StateError,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            MemoryError::PageNotFound(id) => Some(serde_json::json!({ "page_id": id })),
            MemoryError::DocumentNotFound(id) => Some(serde_json::json!({ "document_id": id })),
            MemoryError::MessageIndexOutOfRange { page_id, index } => {
                Some(serde_json::json!({ "page_id": page_id, "index": index }))
            }
            MemoryError::Embedding(e) => e.details(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
