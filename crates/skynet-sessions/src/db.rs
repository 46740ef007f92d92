use rusqlite::Connection;

use crate::error::Result;

/// Initialise the sessions and session_events tables and their indexes.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout, mirroring
/// the teacher's `skynet-sessions::db::init_db` idiom.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id            TEXT PRIMARY KEY,
            session_key   TEXT NOT NULL UNIQUE,
            app_name      TEXT NOT NULL,
            user_id       TEXT NOT NULL,
            session_id    TEXT NOT NULL,
            state         TEXT NOT NULL DEFAULT '{}',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_sessions_user
             ON sessions(app_name, user_id, updated_at DESC);
         CREATE TABLE IF NOT EXISTS session_events (
            session_pk    TEXT NOT NULL REFERENCES sessions(id),
            seq           INTEGER NOT NULL,
            kind          TEXT NOT NULL,
            payload       TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            PRIMARY KEY (session_pk, seq)
         );",
    )?;
    Ok(())
}
