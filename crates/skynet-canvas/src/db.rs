use rusqlite::Connection;

use crate::error::Result;

/// Initialise the canvas tables and their indexes.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout, mirroring
/// the teacher's `skynet-memory::db::init_db` idiom.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS canvases (
            id            TEXT PRIMARY KEY,
            name          TEXT,
            access_rules  TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS canvas_frames (
            id            TEXT PRIMARY KEY,
            canvas_id     TEXT NOT NULL REFERENCES canvases(id),
            parent_id     TEXT REFERENCES canvas_frames(id),
            name          TEXT NOT NULL,
            meta          TEXT NOT NULL DEFAULT '{}',
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_frames_canvas
            ON canvas_frames(canvas_id);
        CREATE TABLE IF NOT EXISTS canvas_elements (
            id            TEXT PRIMARY KEY,
            canvas_id     TEXT NOT NULL REFERENCES canvases(id),
            element_type  TEXT NOT NULL,
            name          TEXT,
            content       TEXT NOT NULL,
            created_by    TEXT NOT NULL,
            attributes    TEXT NOT NULL DEFAULT '{}',
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_elements_canvas
            ON canvas_elements(canvas_id, created_at DESC);
        CREATE TABLE IF NOT EXISTS canvas_element_frame_links (
            element_id    TEXT NOT NULL REFERENCES canvas_elements(id),
            frame_id      TEXT NOT NULL REFERENCES canvas_frames(id),
            PRIMARY KEY (element_id, frame_id)
        );
        CREATE INDEX IF NOT EXISTS idx_links_frame
            ON canvas_element_frame_links(frame_id);",
    )?;
    Ok(())
}
