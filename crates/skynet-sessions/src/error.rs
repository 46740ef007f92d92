use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {key}")]
    NotFound { key: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Expected format: `app:{app_name}:user:{user_id}:session:{session_id}`.
    #[error("invalid session key: {0}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl From<SessionError> for skynet_core::CanvasError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound { key } => skynet_core::CanvasError::NotFound(key),
            SessionError::Database(err) => skynet_core::CanvasError::Database(err.to_string()),
            SessionError::InvalidKey(msg) => skynet_core::CanvasError::Validation(msg),
            SessionError::Serialization(err) => skynet_core::CanvasError::Serialization(err),
        }
    }
}
