use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct SummarizeRequest {
    pub chat_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    /// `messages` or `documents`; only `messages` is meaningful here since
    /// the document/knowledge backend is out of scope for this runtime.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub since_datetime: Option<String>,
}

#[derive(Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
}

#[derive(Serialize)]
pub struct SummarizeError {
    pub error: String,
}

/// POST /summarize — delegates to `chat_summarizer` by driving a synthetic
/// turn through the orchestrator rather than querying the store directly,
/// so the same `fetch_elements` grammar and tenancy rules apply (spec §6).
pub async fn summarize_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, (StatusCode, Json<SummarizeError>)> {
    if !req.tags.is_empty() && req.scope.as_deref() != Some("documents") {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(SummarizeError { error: "tags are only meaningful with scope=documents".to_string() }),
        ));
    }

    let mut prompt = "Summarize the recent canvas activity for this chat.".to_string();
    if let Some(limit) = req.limit {
        prompt.push_str(&format!(" Limit to the {limit} most recent elements."));
    }
    if let Some(since) = &req.since_datetime {
        prompt.push_str(&format!(" Only consider elements since {since}."));
    }
    if matches!(req.scope.as_deref(), Some("documents")) {
        prompt.push_str(" Scope: documents only.");
        if !req.tags.is_empty() {
            prompt.push_str(&format!(" Tags: {}.", req.tags.join(", ")));
        }
    }

    let outcome = state
        .runner
        .run_turn("http:summarize", &req.chat_id, &prompt)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(SummarizeError { error: e.to_string() })))?;

    let summary = match outcome {
        skynet_agent::TurnOutcome::Text(text) => text,
        skynet_agent::TurnOutcome::Silent => String::new(),
    };

    Ok(Json(SummarizeResponse { summary }))
}
