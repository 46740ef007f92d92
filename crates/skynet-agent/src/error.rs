use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("quota exhausted for model {model}: {metric} limit {limit} (retry after {retry_after_ms:?}ms)")]
    QuotaExhausted {
        model: String,
        metric: String,
        limit: u64,
        retry_after_ms: Option<u64>,
    },

    #[error("transient LLM failure: {0}")]
    TransientLlm(String),

    #[error("LLM client error: {0}")]
    LlmClient(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("turn deadline exceeded")]
    DeadlineExceeded,

    #[error("canvas store error: {0}")]
    Canvas(#[from] skynet_canvas::CanvasStoreError),

    #[error("session error: {0}")]
    Session(#[from] skynet_sessions::SessionError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<AgentError> for skynet_core::CanvasError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Validation(msg) => skynet_core::CanvasError::Validation(msg),
            AgentError::QuotaExhausted { model, metric, limit, retry_after_ms } => {
                skynet_core::CanvasError::QuotaExhausted { model, metric, limit, retry_after_ms }
            }
            AgentError::TransientLlm(msg) => skynet_core::CanvasError::TransientLlm(msg),
            AgentError::LlmClient(msg) => skynet_core::CanvasError::LlmClient(msg),
            AgentError::Cancelled => skynet_core::CanvasError::Cancelled,
            AgentError::DeadlineExceeded => skynet_core::CanvasError::Cancelled,
            AgentError::Canvas(err) => err.into(),
            AgentError::Session(err) => err.into(),
            AgentError::Serialization(err) => skynet_core::CanvasError::Serialization(err),
        }
    }
}
