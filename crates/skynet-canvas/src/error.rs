use thiserror::Error;

/// Canvas Store errors. Same-canvas invariant violations get their own
/// variant so callers can distinguish a tenancy bug from a plain miss
/// (spec §4.1's "Failure modes").
#[derive(Debug, Error)]
pub enum CanvasStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cross-canvas violation: {0}")]
    CrossCanvas(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CanvasStoreError>;

impl From<CanvasStoreError> for skynet_core::CanvasError {
    fn from(e: CanvasStoreError) -> Self {
        match e {
            CanvasStoreError::Database(err) => skynet_core::CanvasError::Database(err.to_string()),
            CanvasStoreError::Validation(msg) => skynet_core::CanvasError::Validation(msg),
            CanvasStoreError::NotFound(msg) => skynet_core::CanvasError::NotFound(msg),
            CanvasStoreError::CrossCanvas(msg) => skynet_core::CanvasError::CrossCanvas(msg),
            CanvasStoreError::Serialization(err) => skynet_core::CanvasError::Serialization(err),
        }
    }
}
