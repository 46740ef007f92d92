pub mod error;
pub mod normalize;
pub mod paths;
pub mod safe_send;
pub mod transcribe;
pub mod vision;

pub use error::IngestError;
pub use normalize::IngestPipeline;
pub use transcribe::{NullTranscriber, Transcriber};
pub use vision::{NullVisionDescriber, VisionDescriber};
