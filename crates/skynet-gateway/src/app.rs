use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use rusqlite::Connection;

use skynet_agent::tools::admin::admin_tools;
use skynet_agent::tools::canvas::canvas_tools;
use skynet_agent::tools::history::FetchElementsTool;
use skynet_agent::{build_canonical_tree, GeminiProvider, LlmProvider, Runner};
use skynet_canvas::CanvasStore;
use skynet_core::config::{CanvasConfig, RunEnv};
use skynet_ingest::{IngestPipeline, NullTranscriber, NullVisionDescriber};
use skynet_sessions::SessionManager;

/// Central shared state, passed as `Arc<AppState>` to every handler.
pub struct AppState {
    pub config: CanvasConfig,
    pub canvas: Arc<CanvasStore>,
    pub runner: Arc<Runner>,
    pub ingest: IngestPipeline,
}

impl AppState {
    /// Wire the runtime together from a loaded config: open both SQLite
    /// connections, build the canonical agent tree, and construct the
    /// single `Runner` every HTTP handler drives turns through.
    pub fn new(config: CanvasConfig) -> anyhow::Result<Self> {
        for path in [&config.db_path, &config.session_db_path] {
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir_all(&config.images_path)?;

        let canvas_conn = Connection::open(&config.db_path)?;
        skynet_canvas::db::init_db(&canvas_conn)?;
        let canvas = Arc::new(CanvasStore::new(canvas_conn));

        let session_conn = Connection::open(&config.session_db_path)?;
        skynet_sessions::db::init_db(&session_conn)?;
        let sessions = Arc::new(SessionManager::new(session_conn));

        let api_key = config
            .google_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("GOOGLE_API_KEY is required"))?;
        let provider: Arc<dyn LlmProvider> = Arc::new(GeminiProvider::new(api_key));

        let history_tools: Vec<_> = vec![Arc::new(FetchElementsTool::new(canvas.clone())) as Arc<dyn skynet_agent::tools::Tool>];
        let canvas_tool_set = canvas_tools(canvas.clone());
        let mut combined_canvas_tools = canvas_tool_set;
        combined_canvas_tools.extend(history_tools.clone());
        let admin_enabled = config.env == RunEnv::Dev;

        let tree = build_canonical_tree(
            &config.gemini_model_smart,
            history_tools,
            combined_canvas_tools,
            admin_tools(admin_enabled),
        )?;

        let runner = Arc::new(Runner::new("skynet-canvas", sessions, canvas.clone(), provider, tree));

        let ingest = IngestPipeline::new(
            canvas.clone(),
            runner.clone(),
            Arc::new(NullTranscriber),
            Arc::new(NullVisionDescriber),
            PathBuf::from(&config.images_path),
        );

        Ok(Self { config, canvas, runner, ingest })
    }
}

/// Assemble the full Axum router (spec §6).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::health::health_handler))
        .route("/ingest", post(crate::http::ingest::ingest_handler))
        .route("/summarize", post(crate::http::summarize::summarize_handler))
        .route("/ask", post(crate::http::ask::ask_handler))
        .route("/chat/message", post(crate::http::chat::chat_message_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
