use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::types::{Session, SessionEvent, SessionKey};

/// Thread-safe manager for persisted sessions and their event logs.
///
/// Wraps a single SQLite connection in a `Mutex`, following the teacher's
/// `SessionManager` — sufficient for a single-node deployment.
pub struct SessionManager {
    db: Mutex<Connection>,
}

impl SessionManager {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Return an existing session or create a new empty one (upsert).
    #[instrument(skip(self), fields(key = %key))]
    pub fn get_or_create(&self, key: &SessionKey) -> Result<Session> {
        if let Some(session) = self.get(key)? {
            debug!("session cache hit");
            return Ok(session);
        }

        let id = Uuid::now_v7().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let key_str = key.format();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO sessions
             (id, session_key, app_name, user_id, session_id, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, '{}', ?6, ?6)",
            params![id, key_str, key.app_name, key.user_id, key.session_id, now],
        )?;

        db.query_row(
            "SELECT id, session_key, app_name, user_id, session_id, state, created_at, updated_at
             FROM sessions WHERE session_key = ?1",
            params![key_str],
            row_to_session,
        )
        .map_err(SessionError::Database)
    }

    #[instrument(skip(self), fields(key = %key))]
    pub fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        let key_str = key.format();
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, session_key, app_name, user_id, session_id, state, created_at, updated_at
             FROM sessions WHERE session_key = ?1",
            params![key_str],
            row_to_session,
        )
        .optional()
        .map_err(SessionError::Database)
    }

    /// List the most-recently-updated sessions for a user, newest first.
    #[instrument(skip(self), fields(app_name, user_id, limit))]
    pub fn list_for_user(&self, app_name: &str, user_id: &str, limit: usize) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_key, app_name, user_id, session_id, state, created_at, updated_at
             FROM sessions
             WHERE app_name = ?1 AND user_id = ?2
             ORDER BY updated_at DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![app_name, user_id, limit as i64], row_to_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Shallow-merge `patch` into the session's `state` object and bump
    /// `updated_at`. Existing keys not present in `patch` are preserved.
    #[instrument(skip(self, patch), fields(key = %key))]
    pub fn update_state(&self, key: &SessionKey, patch: Map<String, Value>) -> Result<Session> {
        let key_str = key.format();
        let db = self.db.lock().unwrap();

        let current_json: String = db
            .query_row(
                "SELECT state FROM sessions WHERE session_key = ?1",
                params![key_str],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| SessionError::NotFound { key: key_str.clone() })?;

        let mut state: Map<String, Value> = serde_json::from_str(&current_json)?;
        for (k, v) in patch {
            state.insert(k, v);
        }
        let new_json = serde_json::to_string(&state)?;
        let now = chrono::Utc::now().to_rfc3339();

        db.execute(
            "UPDATE sessions SET state = ?1, updated_at = ?2 WHERE session_key = ?3",
            params![new_json, now, key_str],
        )?;

        db.query_row(
            "SELECT id, session_key, app_name, user_id, session_id, state, created_at, updated_at
             FROM sessions WHERE session_key = ?1",
            params![key_str],
            row_to_session,
        )
        .map_err(SessionError::Database)
    }

    /// Append one event to the session's log, assigning the next `seq`.
    #[instrument(skip(self, payload), fields(key = %key, kind))]
    pub fn append_event(&self, key: &SessionKey, kind: &str, payload: Value) -> Result<SessionEvent> {
        let key_str = key.format();
        let db = self.db.lock().unwrap();

        let session_pk: String = db
            .query_row(
                "SELECT id FROM sessions WHERE session_key = ?1",
                params![key_str],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| SessionError::NotFound { key: key_str.clone() })?;

        let next_seq: i64 = db
            .query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM session_events WHERE session_pk = ?1",
                params![session_pk],
                |row| row.get(0),
            )?;

        let now = chrono::Utc::now().to_rfc3339();
        let payload_json = serde_json::to_string(&payload)?;
        db.execute(
            "INSERT INTO session_events (session_pk, seq, kind, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_pk, next_seq, kind, payload_json, now],
        )?;

        Ok(SessionEvent { seq: next_seq, kind: kind.to_string(), payload, created_at: now })
    }

    /// List events for a session in ascending `seq` order, optionally
    /// starting strictly after `since_seq`.
    #[instrument(skip(self), fields(key = %key, since_seq))]
    pub fn list_events(&self, key: &SessionKey, since_seq: Option<i64>) -> Result<Vec<SessionEvent>> {
        let key_str = key.format();
        let db = self.db.lock().unwrap();

        let session_pk: String = db
            .query_row(
                "SELECT id FROM sessions WHERE session_key = ?1",
                params![key_str],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| SessionError::NotFound { key: key_str.clone() })?;

        let mut stmt = db.prepare(
            "SELECT seq, kind, payload, created_at FROM session_events
             WHERE session_pk = ?1 AND seq > ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![session_pk, since_seq.unwrap_or(0)], |row| {
            let payload_json: String = row.get(2)?;
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, payload_json, row.get::<_, String>(3)?))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (seq, kind, payload_json, created_at) = row?;
            let payload = serde_json::from_str(&payload_json)?;
            events.push(SessionEvent { seq, kind, payload, created_at });
        }
        Ok(events)
    }

    #[instrument(skip(self), fields(key = %key))]
    pub fn delete(&self, key: &SessionKey) -> Result<()> {
        let key_str = key.format();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "DELETE FROM sessions WHERE session_key = ?1",
            params![key_str],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: key_str });
        }
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let state_json: String = row.get(5)?;
    let state: Map<String, Value> = serde_json::from_str(&state_json).unwrap_or_default();
    Ok(Session {
        id: row.get(0)?,
        key: SessionKey {
            app_name: row.get(2)?,
            user_id: row.get(3)?,
            session_id: row.get(4)?,
        },
        state,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> SessionManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        SessionManager::new(conn)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mgr = test_manager();
        let key = SessionKey::new("app", "u1", "s1");
        let a = mgr.get_or_create(&key).unwrap();
        let b = mgr.get_or_create(&key).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn update_state_merges_without_clobbering() {
        let mgr = test_manager();
        let key = SessionKey::new("app", "u1", "s1");
        mgr.get_or_create(&key).unwrap();

        let mut patch1 = Map::new();
        patch1.insert("chat_id".to_string(), Value::String("42".to_string()));
        mgr.update_state(&key, patch1).unwrap();

        let mut patch2 = Map::new();
        patch2.insert("topic".to_string(), Value::String("canvas".to_string()));
        let session = mgr.update_state(&key, patch2).unwrap();

        assert_eq!(session.chat_id(), Some("42"));
        assert_eq!(session.state.get("topic").and_then(Value::as_str), Some("canvas"));
    }

    #[test]
    fn events_have_strictly_increasing_seq() {
        let mgr = test_manager();
        let key = SessionKey::new("app", "u1", "s1");
        mgr.get_or_create(&key).unwrap();

        let e1 = mgr.append_event(&key, "user_message", Value::String("hi".into())).unwrap();
        let e2 = mgr.append_event(&key, "agent_reply", Value::String("hello".into())).unwrap();
        assert_eq!(e1.seq, 1);
        assert_eq!(e2.seq, 2);

        let events = mgr.list_events(&key, None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 1);

        let since = mgr.list_events(&key, Some(1)).unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].seq, 2);
    }

    #[test]
    fn append_event_requires_existing_session() {
        let mgr = test_manager();
        let key = SessionKey::new("app", "u1", "missing");
        let err = mgr.append_event(&key, "user_message", Value::Null).unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }
}
