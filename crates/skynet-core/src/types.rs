use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Time-sortable identifier shared by canvases, frames, and elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasId(pub String);

impl CanvasId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CanvasId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CanvasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CanvasId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CanvasId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Builds the `"<source>:<scope>:<id>"` access-rule string for a Telegram chat.
pub fn telegram_chat_access_rule(chat_id: &str) -> String {
    format!("telegram:chat:{chat_id}")
}

/// The chat media kinds the ingestion pipeline normalises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Text,
    Voice,
    Image,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Text => write!(f, "text"),
            MediaType::Voice => write!(f, "voice"),
            MediaType::Image => write!(f, "image"),
        }
    }
}

/// Envelope the chat front-end (out of scope — see spec §1) hands to the
/// runtime for every inbound message, regardless of channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_nick: Option<String>,
    pub text: Option<String>,
    pub message_id: String,
    pub reply_to_message_id: Option<String>,
    pub media_type: MediaType,
    pub is_forward: bool,
    /// Present for forwarded messages when the original author is known.
    pub forward_author_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_rule_format() {
        assert_eq!(
            telegram_chat_access_rule("-100123"),
            "telegram:chat:-100123"
        );
    }
}
