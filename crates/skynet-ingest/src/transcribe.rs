use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// External collaborator for speech-to-text. Language detection is the
/// adapter's responsibility (Ukrainian/Russian/English per the ingestion
/// contract); this trait only carries the audio path in and transcript out.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Stand-in transcriber until a real speech backend is wired up. Always
/// returns an empty string, which callers must treat as a failed
/// transcription per the ingestion pipeline's "empty transcription is a
/// failure" rule.
pub struct NullTranscriber;

#[async_trait]
impl Transcriber for NullTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
        Ok(String::new())
    }
}
