use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use skynet_core::types::{InboundMessage, MediaType};

use crate::app::AppState;

#[derive(Deserialize)]
struct IngestMetadata {
    chat_id: String,
    user_id: String,
    #[serde(default)]
    user_nick: Option<String>,
    user_name: String,
    #[serde(default)]
    message_id: Option<String>,
    /// `text`, `voice`, or `image`.
    media_type: String,
    #[serde(default)]
    forwarded_from: Option<String>,
    #[serde(default)]
    ext: Option<String>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Serialize)]
pub struct IngestError {
    pub error: String,
}

/// POST /ingest — multipart with optional `file`, optional `text`, required
/// `metadata` JSON (spec §6).
pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, (StatusCode, Json<IngestError>)> {
    let mut metadata: Option<IngestMetadata> = None;
    let mut text_field: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| bad_request(e.to_string()))? {
        match field.name().unwrap_or("") {
            "metadata" => {
                let raw = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                metadata = Some(serde_json::from_str(&raw).map_err(|e| bad_request(format!("invalid metadata: {e}")))?);
            }
            "text" => {
                text_field = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?);
            }
            "file" => {
                file_bytes = Some(field.bytes().await.map_err(|e| bad_request(e.to_string()))?.to_vec());
            }
            _ => {}
        }
    }

    let metadata = metadata.ok_or_else(|| bad_request("missing required 'metadata' field".to_string()))?;
    if !state.config.chat_allowed(&metadata.chat_id) {
        return Err(forbidden("chat_id is not in the allowed list".to_string()));
    }
    let request_id = Uuid::now_v7().to_string();

    let media_type = match metadata.media_type.as_str() {
        "text" => MediaType::Text,
        "voice" => MediaType::Voice,
        "image" => MediaType::Image,
        other => return Err(bad_request(format!("unknown media_type '{other}'"))),
    };

    let msg = InboundMessage {
        chat_id: metadata.chat_id.clone(),
        user_id: metadata.user_id.clone(),
        user_name: metadata.user_name.clone(),
        user_nick: metadata.user_nick.clone(),
        text: text_field.clone(),
        message_id: metadata.message_id.clone().unwrap_or_default(),
        reply_to_message_id: None,
        media_type,
        is_forward: metadata.forwarded_from.is_some(),
        forward_author_name: metadata.forwarded_from.clone(),
    };

    let reply = match metadata.media_type.as_str() {
        "text" => {
            let text = text_field.ok_or_else(|| bad_request("media_type=text requires a 'text' field".to_string()))?;
            state.ingest.normalize_text(&msg, &text).await.map_err(|e| ingest_failed(e))?
        }
        "voice" => {
            let bytes = file_bytes.ok_or_else(|| bad_request("media_type=voice requires a 'file' field".to_string()))?;
            let scratch = std::env::temp_dir().join(format!("{request_id}.ogg"));
            tokio::fs::write(&scratch, &bytes).await.map_err(|e| internal_error(e.to_string()))?;
            state.ingest.normalize_voice(&msg, &scratch).await.map_err(|e| ingest_failed(e))?
        }
        "image" => {
            let bytes = file_bytes.ok_or_else(|| bad_request("media_type=image requires a 'file' field".to_string()))?;
            let ext = metadata.ext.clone().unwrap_or_else(|| "jpg".to_string());
            let scratch: PathBuf = std::env::temp_dir().join(format!("{request_id}.{ext}"));
            tokio::fs::write(&scratch, &bytes).await.map_err(|e| internal_error(e.to_string()))?;
            state.ingest.normalize_image(&msg, &scratch, &ext).await.map_err(|e| ingest_failed(e))?
        }
        other => return Err(bad_request(format!("unknown media_type '{other}'"))),
    };

    Ok(Json(IngestResponse {
        status: "ok",
        id: request_id,
        text: if reply.is_empty() { None } else { Some(reply) },
    }))
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<IngestError>) {
    (StatusCode::BAD_REQUEST, Json(IngestError { error: msg.into() }))
}

fn forbidden(msg: impl Into<String>) -> (StatusCode, Json<IngestError>) {
    (StatusCode::FORBIDDEN, Json(IngestError { error: msg.into() }))
}

fn internal_error(msg: impl Into<String>) -> (StatusCode, Json<IngestError>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(IngestError { error: msg.into() }))
}

fn ingest_failed(e: skynet_ingest::IngestError) -> (StatusCode, Json<IngestError>) {
    warn!(error = %e, "POST /ingest failed");
    internal_error(e.to_string())
}
