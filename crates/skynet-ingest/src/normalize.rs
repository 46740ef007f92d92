use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use skynet_agent::{Runner, TurnOutcome};
use skynet_canvas::CanvasStore;
use skynet_core::types::InboundMessage;

use crate::error::{IngestError, Result};
use crate::paths::sharded_image_path;
use crate::safe_send::safe_truncate;
use crate::transcribe::Transcriber;
use crate::vision::{parse_slug, VisionDescriber};

/// The handle to attribute authorship to, resolving forwards to the
/// original author rather than the forwarder (spec §4.6).
fn effective_author(msg: &InboundMessage) -> &str {
    if msg.is_forward {
        msg.forward_author_name.as_deref().unwrap_or(&msg.user_name)
    } else {
        msg.user_nick.as_deref().unwrap_or(&msg.user_name)
    }
}

/// Ties the canvas store, runtime, and media adapters together into the
/// three ingestion paths the pipeline exposes: text, voice, image.
pub struct IngestPipeline {
    canvas: Arc<CanvasStore>,
    runner: Arc<Runner>,
    transcriber: Arc<dyn Transcriber>,
    vision: Arc<dyn VisionDescriber>,
    images_root: PathBuf,
}

impl IngestPipeline {
    pub fn new(
        canvas: Arc<CanvasStore>,
        runner: Arc<Runner>,
        transcriber: Arc<dyn Transcriber>,
        vision: Arc<dyn VisionDescriber>,
        images_root: PathBuf,
    ) -> Self {
        Self { canvas, runner, transcriber, vision, images_root }
    }

    fn base_attributes(msg: &InboundMessage) -> BTreeMap<String, serde_json::Value> {
        let mut attrs = BTreeMap::new();
        if msg.is_forward {
            attrs.insert("is_forward".to_string(), json!(true));
            attrs.insert("forwarded_by".to_string(), json!(msg.user_name));
        }
        attrs
    }

    /// Record a plain text/message element and forward it to the agent
    /// runtime, returning a reply bounded for direct display.
    #[instrument(skip(self, msg, text))]
    pub async fn normalize_text(&self, msg: &InboundMessage, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(IngestError::Validation("message text must not be empty".to_string()));
        }

        let canvas = self.canvas.get_or_create_canvas_for_chat(&msg.chat_id)?;
        self.canvas.add_element(
            &canvas.id,
            "message",
            text,
            effective_author(msg),
            Self::base_attributes(msg),
            None,
            None,
        )?;

        self.run_turn(msg, text, msg.is_forward).await
    }

    /// Download/transcribe a voice note, store the transcript as a `voice`
    /// element, and forward the transcript as the turn's user message. An
    /// empty transcription is treated as a failure, not an empty-but-valid
    /// transcript (spec §4.6).
    #[instrument(skip(self, msg))]
    pub async fn normalize_voice(&self, msg: &InboundMessage, audio_path: &Path) -> Result<String> {
        let transcript = self
            .transcriber
            .transcribe(audio_path)
            .await
            .map_err(|e| IngestError::TranscriptionFailed(e.to_string()))?;

        if transcript.trim().is_empty() {
            return Err(IngestError::EmptyTranscription);
        }

        let canvas = self.canvas.get_or_create_canvas_for_chat(&msg.chat_id)?;
        let mut attrs = Self::base_attributes(msg);
        attrs.insert("media_path".to_string(), json!(audio_path.to_string_lossy()));

        self.canvas.add_element(&canvas.id, "voice", &transcript, effective_author(msg), attrs, None, None)?;

        // Voice forwards are exempt from the orchestrator's silence rule
        // (spec §4.6: "for non-voice forwards"), so this path never reports
        // is_forward to the runner even when the message itself is one.
        self.run_turn(msg, &transcript, false).await
    }

    /// Describe an image via the vision adapter, move it into its sharded
    /// storage location, record an `image` element, and forward the
    /// description to the agent runtime.
    #[instrument(skip(self, msg))]
    pub async fn normalize_image(&self, msg: &InboundMessage, staged_path: &Path, ext: &str) -> Result<String> {
        let description = self
            .vision
            .describe(staged_path)
            .await
            .map_err(|e| IngestError::VisionFailed(e.to_string()))?;

        if description.trim().is_empty() {
            return Err(IngestError::VisionFailed("vision adapter returned no description".to_string()));
        }

        let element_id = Uuid::now_v7().to_string();
        let slug = parse_slug(&description);
        let final_path = sharded_image_path(&self.images_root, &element_id, &slug, ext);
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(staged_path, &final_path)?;

        let canvas = self.canvas.get_or_create_canvas_for_chat(&msg.chat_id)?;
        let mut attrs = Self::base_attributes(msg);
        attrs.insert("media_path".to_string(), json!(final_path.to_string_lossy()));
        attrs.insert("slug".to_string(), json!(slug));

        self.canvas.add_element(
            &canvas.id,
            "image",
            &description,
            effective_author(msg),
            attrs,
            None,
            Some(&element_id),
        )?;

        self.run_turn(msg, &description, msg.is_forward).await
    }

    async fn run_turn(&self, msg: &InboundMessage, text: &str, is_forward: bool) -> Result<String> {
        let outcome = self.runner.run_turn_with_forward(&msg.user_id, &msg.chat_id, text, is_forward).await?;
        Ok(match outcome {
            TurnOutcome::Text(reply) => safe_truncate(&reply),
            TurnOutcome::Silent => String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use skynet_agent::mock::MockLlmProvider;
    use skynet_agent::{build_canonical_tree, Runner};
    use skynet_sessions::SessionManager;
    use tempfile::tempdir;

    struct StubTranscriber(String);

    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct StubVision(String);

    #[async_trait]
    impl VisionDescriber for StubVision {
        async fn describe(&self, _image_path: &Path) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn build_pipeline(
        dir: &tempfile::TempDir,
        transcriber: Arc<dyn Transcriber>,
        vision: Arc<dyn VisionDescriber>,
    ) -> IngestPipeline {
        build_pipeline_with_reply(dir, transcriber, vision, "ack")
    }

    fn build_pipeline_with_reply(
        dir: &tempfile::TempDir,
        transcriber: Arc<dyn Transcriber>,
        vision: Arc<dyn VisionDescriber>,
        reply: &str,
    ) -> IngestPipeline {
        let conn = Connection::open_in_memory().unwrap();
        skynet_canvas::db::init_db(&conn).unwrap();
        let canvas = Arc::new(CanvasStore::new(conn));

        let sess_conn = Connection::open_in_memory().unwrap();
        skynet_sessions::db::init_db(&sess_conn).unwrap();
        let sessions = Arc::new(SessionManager::new(sess_conn));

        let provider = Arc::new(MockLlmProvider::text(reply));
        let tree = build_canonical_tree("gemini-test", vec![], vec![], vec![]).unwrap();
        let runner = Arc::new(Runner::new("ingest-test", sessions, canvas.clone(), provider, tree));

        IngestPipeline::new(canvas, runner, transcriber, vision, dir.path().join("images"))
    }

    fn msg(chat_id: &str) -> InboundMessage {
        InboundMessage {
            chat_id: chat_id.to_string(),
            user_id: "u1".to_string(),
            user_name: "alice".to_string(),
            user_nick: None,
            text: None,
            message_id: "m1".to_string(),
            reply_to_message_id: None,
            media_type: skynet_core::types::MediaType::Text,
            is_forward: false,
            forward_author_name: None,
        }
    }

    #[tokio::test]
    async fn normalize_text_rejects_empty() {
        let dir = tempdir().unwrap();
        let pipeline = build_pipeline(&dir, Arc::new(StubTranscriber(String::new())), Arc::new(StubVision(String::new())));
        let result = pipeline.normalize_text(&msg("c1"), "   ").await;
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }

    #[tokio::test]
    async fn normalize_voice_rejects_empty_transcription() {
        let dir = tempdir().unwrap();
        let pipeline = build_pipeline(&dir, Arc::new(StubTranscriber(String::new())), Arc::new(StubVision(String::new())));
        let result = pipeline.normalize_voice(&msg("c1"), Path::new("/tmp/does-not-matter.ogg")).await;
        assert!(matches!(result, Err(IngestError::EmptyTranscription)));
    }

    #[tokio::test]
    async fn normalize_image_moves_file_into_sharded_path() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged.jpg");
        std::fs::write(&staged, b"fake-bytes").unwrap();

        let pipeline = build_pipeline(
            &dir,
            Arc::new(StubTranscriber(String::new())),
            Arc::new(StubVision("1) A dog. 5) Slug: happy-dog".to_string())),
        );

        pipeline.normalize_image(&msg("c1"), &staged, "jpg").await.unwrap();
        assert!(!staged.exists());

        let canvas = pipeline.canvas.get_or_create_canvas_for_chat("c1").unwrap();
        let elements = pipeline.canvas.get_elements(&canvas.id, 10, 0, &Default::default()).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].element_type, "image");
        let media_path = elements[0].attributes.get("media_path").unwrap().as_str().unwrap();
        assert!(media_path.contains("happy-dog"));
    }

    #[tokio::test]
    async fn forwarded_message_attributes_to_original_author() {
        let dir = tempdir().unwrap();
        let pipeline = build_pipeline(&dir, Arc::new(StubTranscriber(String::new())), Arc::new(StubVision(String::new())));
        let mut m = msg("c1");
        m.is_forward = true;
        m.forward_author_name = Some("original_author".to_string());

        pipeline.normalize_text(&m, "hello from a forward").await.unwrap();

        let canvas = pipeline.canvas.get_or_create_canvas_for_chat("c1").unwrap();
        let elements = pipeline.canvas.get_elements(&canvas.id, 10, 0, &Default::default()).unwrap();
        assert_eq!(elements[0].created_by, "original_author");
        assert_eq!(elements[0].attributes.get("is_forward").unwrap(), &json!(true));
    }

    #[tokio::test]
    async fn forwarded_text_message_is_silenced_but_still_persisted() {
        let dir = tempdir().unwrap();
        // A reply provider standing in for an orchestrator obeying its
        // silence instruction (spec §4.6, §8 scenario 5).
        let pipeline =
            build_pipeline_with_reply(&dir, Arc::new(StubTranscriber(String::new())), Arc::new(StubVision(String::new())), "");
        let mut m = msg("c1");
        m.is_forward = true;
        m.forward_author_name = Some("original_author".to_string());

        let reply = pipeline.normalize_text(&m, "hello from a forward").await.unwrap();
        assert!(reply.is_empty());

        let canvas = pipeline.canvas.get_or_create_canvas_for_chat("c1").unwrap();
        let elements = pipeline.canvas.get_elements(&canvas.id, 10, 0, &Default::default()).unwrap();
        assert_eq!(elements.len(), 1);
    }
}
