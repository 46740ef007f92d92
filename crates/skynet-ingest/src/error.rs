use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("transcription produced no text")]
    EmptyTranscription,

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("vision description failed: {0}")]
    VisionFailed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("canvas store error: {0}")]
    Canvas(#[from] skynet_canvas::CanvasStoreError),

    #[error("agent error: {0}")]
    Agent(#[from] skynet_agent::AgentError),
}

pub type Result<T> = std::result::Result<T, IngestError>;

impl From<IngestError> for skynet_core::CanvasError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Validation(msg) => skynet_core::CanvasError::Validation(msg),
            IngestError::EmptyTranscription => {
                skynet_core::CanvasError::Validation("empty transcription".to_string())
            }
            IngestError::TranscriptionFailed(msg) => skynet_core::CanvasError::Internal(msg),
            IngestError::VisionFailed(msg) => skynet_core::CanvasError::Internal(msg),
            IngestError::Io(err) => skynet_core::CanvasError::Io(err),
            IngestError::Canvas(err) => err.into(),
            IngestError::Agent(err) => err.into(),
        }
    }
}
