use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SessionError};

/// Structured session identity: `(app_name, user_id, session_id)`.
///
/// Unlike the teacher's user/agent/name triple, the third component here is
/// caller-supplied rather than a free-form slot name — the chat front-end
/// hands the runtime a `session_id` it already minted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Canonical wire format: `app:{app_name}:user:{user_id}:session:{session_id}`.
    pub fn format(&self) -> String {
        format!(
            "app:{}:user:{}:session:{}",
            self.app_name, self.user_id, self.session_id
        )
    }

    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("app:")
            .ok_or_else(|| SessionError::InvalidKey(format!("missing 'app:' prefix: {s}")))?;

        let user_marker = ":user:";
        let user_pos = rest
            .find(user_marker)
            .ok_or_else(|| SessionError::InvalidKey(format!("missing ':user:' segment: {s}")))?;
        let app_name = &rest[..user_pos];
        let after_user = &rest[user_pos + user_marker.len()..];

        let session_marker = ":session:";
        let session_pos = after_user.find(session_marker).ok_or_else(|| {
            SessionError::InvalidKey(format!("missing ':session:' segment: {s}"))
        })?;
        let user_id = &after_user[..session_pos];
        let session_id = &after_user[session_pos + session_marker.len()..];

        if app_name.is_empty() || user_id.is_empty() || session_id.is_empty() {
            return Err(SessionError::InvalidKey(format!(
                "key components must not be empty: {s}"
            )));
        }

        Ok(Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        })
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

/// A persisted conversation session. `state` is a free-form JSON object the
/// runtime and tools read and patch; it must carry a `"chat_id"` entry once
/// the session is bound to a chat front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub key: SessionKey,
    pub state: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    /// Read `state.chat_id` if present, the tenancy anchor every tool
    /// derives its canvas access rule from.
    pub fn chat_id(&self) -> Option<&str> {
        self.state.get("chat_id").and_then(Value::as_str)
    }
}

/// One entry in a session's append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub seq: i64,
    pub kind: String,
    pub payload: Value,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_key() {
        let key = SessionKey::new("chat-runtime", "u-1", "s-1");
        let s = key.format();
        assert_eq!(s, "app:chat-runtime:user:u-1:session:s-1");
        assert_eq!(SessionKey::parse(&s).unwrap(), key);
    }

    #[test]
    fn parse_missing_prefix_errs() {
        assert!(SessionKey::parse("user:u-1:session:s-1").is_err());
    }

    #[test]
    fn chat_id_reads_from_state() {
        let mut state = Map::new();
        state.insert("chat_id".to_string(), Value::String("42".to_string()));
        let session = Session {
            id: "id".into(),
            key: SessionKey::new("a", "u", "s"),
            state,
            created_at: "now".into(),
            updated_at: "now".into(),
        };
        assert_eq!(session.chat_id(), Some("42"));
    }
}
