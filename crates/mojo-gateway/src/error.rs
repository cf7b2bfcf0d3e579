//! Aggregates every subsystem's own error type into one `GatewayError`,
//! and converts any of them into the `{ error: { code, message, details? }
//! }` envelope spec §6 defines for the MCP tool surface. `AuthError`
//! lives here exclusively — it's reserved for the transport boundary,
//! which only the gateway sees.

use mojo_core::error::HasErrorCode;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] mojo_core::CoreError),
    #[error(transparent)]
    Embedding(#[from] mojo_embedding::EmbeddingError),
    #[error(transparent)]
    Llm(#[from] mojo_llm::LlmError),
    #[error(transparent)]
    Memory(#[from] mojo_memory::MemoryError),
    #[error(transparent)]
    Dreaming(#[from] mojo_dreaming::DreamingError),
    #[error(transparent)]
    Scheduler(#[from] mojo_scheduler::SchedulerError),
    #[error(transparent)]
    OpenCode(#[from] mojo_opencode::OpenCodeError),
    #[error("unauthorized: {0}")]
    Auth(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for '{tool}': {reason}")]
    BadArguments { tool: String, reason: String },
    /// A downstream service the gateway itself calls (e.g. a web search
    /// provider) faulted — transient network error, non-2xx status, or an
    /// unparseable body. Distinct from `BadArguments` so retry logic can
    /// tell "your request was wrong" apart from "the backend is down".
    #[error("backend call failed for '{tool}': {reason}")]
    Backend { tool: String, reason: String },
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Config(e) => e.code().as_str(),
            GatewayError::Embedding(e) => e.code().as_str(),
            GatewayError::Llm(e) => e.code().as_str(),
            GatewayError::Memory(e) => e.code().as_str(),
            GatewayError::Dreaming(e) => e.code().as_str(),
            GatewayError::Scheduler(e) => e.code().as_str(),
            GatewayError::OpenCode(e) => e.code().as_str(),
            GatewayError::Auth(_) => "AuthError",
            GatewayError::UnknownTool(_) | GatewayError::BadArguments { .. } => "ValidationError",
            GatewayError::Backend { .. } => "BackendError",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            GatewayError::Config(e) => e.details(),
            GatewayError::Embedding(e) => e.details(),
            GatewayError::Llm(e) => e.details(),
            GatewayError::Memory(e) => e.details(),
            GatewayError::Dreaming(e) => e.details(),
            GatewayError::Scheduler(e) => e.details(),
            GatewayError::OpenCode(e) => e.details(),
            GatewayError::UnknownTool(tool) => Some(json!({ "tool": tool })),
            GatewayError::BadArguments { tool, reason } => Some(json!({ "tool": tool, "reason": reason })),
            GatewayError::Backend { tool, reason } => Some(json!({ "tool": tool, "reason": reason })),
            GatewayError::Auth(_) => None,
        }
    }

    /// `{ error: { code, message, details? } }`. Never includes secret
    /// material (API keys, bearer tokens, SSH key bytes) — subsystem
    /// `details()` implementations are themselves responsible for that,
    /// this just forwards what they produce.
    pub fn to_envelope(&self) -> serde_json::Value {
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(details) = self.details() {
            error["details"] = details;
        }
        json!({ "error": error })
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
