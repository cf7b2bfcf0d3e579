use thiserror::Error;

/// The stable error codes from spec §7, shared by every subsystem's own
/// error enum so the MCP error envelope never has to invent new strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ConfigError,
    BackendError,
    LlmError,
    DimensionError,
    PipelineParseError,
    ValidationError,
    ConflictError,
    NotFoundError,
    TimeoutError,
    StateError,
    AuthError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigError => "ConfigError",
            ErrorCode::BackendError => "BackendError",
            ErrorCode::LlmError => "LLMError",
            ErrorCode::DimensionError => "DimensionError",
            ErrorCode::PipelineParseError => "PipelineParseError",
            ErrorCode::ValidationError => "ValidationError",
            ErrorCode::ConflictError => "ConflictError",
            ErrorCode::NotFoundError => "NotFoundError",
            ErrorCode::TimeoutError => "TimeoutError",
            ErrorCode::StateError => "StateError",
            ErrorCode::AuthError => "AuthError",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Implemented by every subsystem error enum so the gateway can build a
/// uniform `{ error: { code, message, details? } }` envelope without
/// knowing the concrete error type.
pub trait HasErrorCode {
    fn code(&self) -> ErrorCode;

    /// Structured, secret-free details for the MCP error envelope.
    /// Default: no details beyond the error message itself.
    fn details(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Errors owned directly by mojo-core: config loading and the atomic write
/// helper. Fatal at startup per spec §7.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed on-disk state at {path}: {reason}")]
    State { path: String, reason: String },
}

impl HasErrorCode for CoreError {
    fn code(&self) -> ErrorCode {
        match self {
            CoreError::Config(_) => ErrorCode::ConfigError,
            CoreError::Io(_) => ErrorCode::StateError,
            CoreError::State { .. } => ErrorCode::StateError,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
