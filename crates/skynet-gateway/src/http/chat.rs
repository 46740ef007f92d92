use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use skynet_core::types::{InboundMessage, MediaType};

use crate::app::AppState;

#[derive(Deserialize)]
pub struct ChatMessageRequest {
    pub chat_id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub user_nick: Option<String>,
    pub text: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub reply_to_message_id: Option<String>,
    /// When true, the turn runs without recording a canvas element first —
    /// used for ephemeral probes that shouldn't pollute chat history.
    #[serde(default)]
    pub skip_save: bool,
}

#[derive(Serialize)]
pub struct ChatMessageResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

#[derive(Serialize)]
pub struct ChatError {
    pub error: String,
}

/// POST /chat/message (spec §6).
pub async fn chat_message_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatMessageRequest>,
) -> Result<Json<ChatMessageResponse>, (StatusCode, Json<ChatError>)> {
    if req.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError { error: "text must not be empty".to_string() }),
        ));
    }
    if !state.config.chat_allowed(&req.chat_id) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ChatError { error: "chat_id is not in the allowed list".to_string() }),
        ));
    }

    let reply = if req.skip_save {
        let outcome = state
            .runner
            .run_turn(&req.user_id, &req.chat_id, &req.text)
            .await
            .map_err(|e| internal_error(&e.to_string()))?;
        match outcome {
            skynet_agent::TurnOutcome::Text(text) => Some(text),
            skynet_agent::TurnOutcome::Silent => None,
        }
    } else {
        let msg = InboundMessage {
            chat_id: req.chat_id.clone(),
            user_id: req.user_id.clone(),
            user_name: req.user_name.clone(),
            user_nick: req.user_nick.clone(),
            text: Some(req.text.clone()),
            message_id: req.message_id.clone().unwrap_or_default(),
            reply_to_message_id: req.reply_to_message_id.clone(),
            media_type: MediaType::Text,
            is_forward: false,
            forward_author_name: None,
        };
        let reply = state
            .ingest
            .normalize_text(&msg, &req.text)
            .await
            .map_err(|e| {
                warn!(error = %e, "POST /chat/message ingest failed");
                internal_error(&e.to_string())
            })?;
        if reply.is_empty() { None } else { Some(reply) }
    };

    Ok(Json(ChatMessageResponse { reply }))
}

fn internal_error(msg: &str) -> (StatusCode, Json<ChatError>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ChatError { error: msg.to_string() }))
}
