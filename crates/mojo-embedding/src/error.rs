use mojo_core::error::{ErrorCode, HasErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model '{model}' is unavailable: {reason}")]
    Backend { model: String, reason: String },

    #[error("embedding backend for '{model}' returned dimension {got}, expected {expected}")]
    Dimension {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("embedding call to '{model}' timed out after {ms}ms")]
    Timeout { model: String, ms: u64 },

    #[error("unknown embedding model: {0}")]
    UnknownModel(String),
}

impl HasErrorCode for EmbeddingError {
    fn code(&self) -> ErrorCode {
        match self {
            EmbeddingError::Backend { .. } => ErrorCode::BackendError,
            EmbeddingError::Dimension { .. } => ErrorCode::DimensionError,
            EmbeddingError::Timeout { .. } => ErrorCode::TimeoutError,
            EmbeddingError::UnknownModel(_) => ErrorCode::NotFoundError,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            EmbeddingError::Backend { model, .. } => Some(serde_json::json!({ "model": model })),
            EmbeddingError::Dimension { model, expected, got } => {
                Some(serde_json::json!({ "model": model, "expected": expected, "got": got }))
            }
            EmbeddingError::Timeout { model, ms } => {
                Some(serde_json::json!({ "model": model, "timeout_ms": ms }))
            }
            EmbeddingError::UnknownModel(model) => Some(serde_json::json!({ "model": model })),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;
