use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub history: Vec<String>,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub answer: String,
    /// Always empty: the knowledge/vector backend is out of scope for this
    /// runtime (see `skynet_agent::tools::knowledge::NullVectorStore`).
    pub sources: Vec<String>,
}

#[derive(Serialize)]
pub struct AskError {
    pub error: String,
}

/// POST /ask — one-off question answering, independent of chat history
/// persistence (spec §6). When `chat_id` is omitted, a throwaway session id
/// is minted so the turn still runs through the ordinary Runner path.
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<AskError>)> {
    if req.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, Json(AskError { error: "query must not be empty".to_string() })));
    }

    let chat_id = req.chat_id.clone().unwrap_or_else(|| format!("ask:{}", Uuid::now_v7()));

    let mut prompt = req.query.clone();
    if !req.history.is_empty() {
        prompt = format!("Prior turns:\n{}\n\nQuestion: {}", req.history.join("\n"), req.query);
    }

    let outcome = state
        .runner
        .run_turn("http:ask", &chat_id, &prompt)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(AskError { error: e.to_string() })))?;

    let answer = match outcome {
        skynet_agent::TurnOutcome::Text(text) => text,
        skynet_agent::TurnOutcome::Silent => String::new(),
    };

    Ok(Json(AskResponse { answer, sources: Vec::new() }))
}
