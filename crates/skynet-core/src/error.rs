use thiserror::Error;

/// Error taxonomy shared across the runtime. Kinds map 1:1 onto the
/// propagation rules a tool or the Runner applies to them — see each
/// variant's doc comment for where it surfaces and whether it retries.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// Bad arguments: empty content, non-integer chat_id, malformed ISO date.
    /// Tools return this as a diagnostic string; the runtime never panics on it.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing element/frame/canvas. Tools return an empty result or a
    /// diagnostic string rather than raising.
    #[error("not found: {0}")]
    NotFound(String),

    /// A frame or element does not belong to the chat's canvas.
    /// Logged at WARN — a violation here is a potential tenancy bug.
    #[error("cross-canvas violation: {0}")]
    CrossCanvas(String),

    /// LLM returned 429. Never retried by the Runner; surfaced immediately.
    #[error("quota exhausted: model={model} metric={metric} limit={limit}{retry}",
        retry = .retry_after_ms.map(|ms| format!(" retry_after_ms={ms}")).unwrap_or_default())]
    QuotaExhausted {
        model: String,
        metric: String,
        limit: u64,
        retry_after_ms: Option<u64>,
    },

    /// 5xx / network / service-unavailable from the LLM. Retried per the
    /// Runner's backoff policy; this is the error returned after the cap.
    #[error("transient LLM error: {0}")]
    TransientLlm(String),

    /// Client error (400/404) from the LLM. Not retried.
    #[error("LLM client error: {0}")]
    LlmClient(String),

    /// Turn deadline expired or an external cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,

    /// Missing API key, bad model handle, or other startup misconfiguration.
    /// Causes the process to fail loudly rather than start half-configured.
    #[error("configuration error: {0}")]
    FatalConfig(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CanvasError {
    /// Short error code, used when an error crosses an API boundary (HTTP
    /// responses, logged tool results).
    pub fn code(&self) -> &'static str {
        match self {
            CanvasError::Validation(_) => "VALIDATION_ERROR",
            CanvasError::NotFound(_) => "NOT_FOUND",
            CanvasError::CrossCanvas(_) => "CROSS_CANVAS_ERROR",
            CanvasError::QuotaExhausted { .. } => "QUOTA_EXHAUSTED",
            CanvasError::TransientLlm(_) => "TRANSIENT_LLM_ERROR",
            CanvasError::LlmClient(_) => "LLM_CLIENT_ERROR",
            CanvasError::Cancelled => "CANCELLED",
            CanvasError::FatalConfig(_) => "FATAL_CONFIG",
            CanvasError::Database(_) => "DATABASE_ERROR",
            CanvasError::Serialization(_) => "SERIALIZATION_ERROR",
            CanvasError::Io(_) => "IO_ERROR",
            CanvasError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors the Runner's backoff policy should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CanvasError::TransientLlm(_))
    }
}

pub type Result<T> = std::result::Result<T, CanvasError>;
