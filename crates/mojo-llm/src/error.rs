use mojo_core::error::{ErrorCode, HasErrorCode};
use thiserror::Error;

/// `LLMError { provider, model, reason }` from spec §4.2 — never silently
/// degrades, so this is the only shape an LLM call can fail with (plus the
/// dedicated `Timeout` variant for the external-call budget every call
/// has per spec §5).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM call to {provider}/{model} failed: {reason}")]
    Call {
        provider: String,
        model: String,
        reason: String,
    },

    #[error("LLM call to {provider}/{model} timed out after {ms}ms")]
    Timeout {
        provider: String,
        model: String,
        ms: u64,
    },

    #[error("no route configured for task tag '{0}'")]
    UnknownTaskTag(String),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
}

impl HasErrorCode for LlmError {
    fn code(&self) -> ErrorCode {
        match self {
            LlmError::Call { .. } => ErrorCode::LlmError,
            LlmError::Timeout { .. } => ErrorCode::TimeoutError,
            LlmError::UnknownTaskTag(_) => ErrorCode::ValidationError,
            LlmError::UnknownProvider(_) => ErrorCode::ValidationError,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            LlmError::Call { provider, model, .. } | LlmError::Timeout { provider, model, .. } => {
                Some(serde_json::json!({ "provider": provider, "model": model }))
            }
            LlmError::UnknownTaskTag(tag) => Some(serde_json::json!({ "task_tag": tag })),
            LlmError::UnknownProvider(p) => Some(serde_json::json!({ "provider": p })),
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
