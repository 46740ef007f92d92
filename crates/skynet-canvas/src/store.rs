use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{instrument, warn};
use uuid::Uuid;

use skynet_core::types::telegram_chat_access_rule;

use crate::error::{CanvasStoreError, Result};
use crate::types::{Canvas, CanvasElement, CanvasFrame, ElementFilter, ElementUpdate};

/// Durable entity store for canvases, frames, elements, and their links.
///
/// Wraps a single SQLite connection in a `Mutex`, the same concurrency
/// model the teacher uses for `skynet-sessions::SessionManager` and
/// `skynet-memory::MemoryManager` — sufficient for a single-node deployment.
pub struct CanvasStore {
    db: Mutex<Connection>,
}

impl CanvasStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    // ---------------------------------------------------------------
    // Canvas
    // ---------------------------------------------------------------

    /// Look up the canvas whose `access_rules` contains
    /// `"telegram:chat:<chat_id>"`, creating it if absent.
    ///
    /// Idempotent under concurrent first-access: a secondary
    /// `canvas_access_keys(rule TEXT PRIMARY KEY)` index table turns the
    /// race into a `INSERT OR IGNORE` + read-back, mirroring the teacher's
    /// `SessionManager::get_or_create` pattern.
    #[instrument(skip(self), fields(chat_id))]
    pub fn get_or_create_canvas_for_chat(&self, chat_id: &str) -> Result<Canvas> {
        let rule = telegram_chat_access_rule(chat_id);
        let db = self.db.lock().unwrap();
        ensure_access_key_table(&db)?;

        if let Some(canvas_id) = lookup_access_key(&db, &rule)? {
            return row_to_canvas_by_id(&db, &canvas_id);
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let access_rules = serde_json::to_string(&vec![rule.clone()])?;

        db.execute(
            "INSERT INTO canvases (id, name, access_rules, created_at) VALUES (?1, NULL, ?2, ?3)",
            params![id, access_rules, now],
        )?;
        db.execute(
            "INSERT OR IGNORE INTO canvas_access_keys (rule, canvas_id) VALUES (?1, ?2)",
            params![rule, id],
        )?;

        // Re-read: if another writer won the race, the row we just inserted
        // into `canvases` is orphaned but harmless — the access key always
        // points at exactly one canvas.
        let winning_id = lookup_access_key(&db, &rule)?
            .ok_or_else(|| CanvasStoreError::NotFound(format!("access rule {rule}")))?;
        row_to_canvas_by_id(&db, &winning_id)
    }

    #[instrument(skip(self))]
    pub fn get_canvas(&self, canvas_id: &str) -> Result<Option<Canvas>> {
        let db = self.db.lock().unwrap();
        row_to_canvas_by_id(&db, canvas_id).map(Some).or_else(|e| match e {
            CanvasStoreError::NotFound(_) => Ok(None),
            other => Err(other),
        })
    }

    #[instrument(skip(self))]
    pub fn update_canvas(&self, canvas_id: &str, name: Option<String>) -> Result<Canvas> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE canvases SET name = ?1 WHERE id = ?2",
            params![name, canvas_id],
        )?;
        if changed == 0 {
            return Err(CanvasStoreError::NotFound(format!("canvas {canvas_id}")));
        }
        row_to_canvas_by_id(&db, canvas_id)
    }

    // ---------------------------------------------------------------
    // Frames
    // ---------------------------------------------------------------

    #[instrument(skip(self, meta))]
    pub fn create_frame(
        &self,
        canvas_id: &str,
        parent_id: Option<&str>,
        name: &str,
        meta: BTreeMap<String, serde_json::Value>,
    ) -> Result<CanvasFrame> {
        let db = self.db.lock().unwrap();

        if let Some(parent) = parent_id {
            require_same_canvas_frame(&db, parent, canvas_id)?;
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let meta_json = serde_json::to_string(&meta)?;

        db.execute(
            "INSERT INTO canvas_frames (id, canvas_id, parent_id, name, meta, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, canvas_id, parent_id, name, meta_json, now],
        )?;

        row_to_frame_by_id(&db, &id)
    }

    #[instrument(skip(self))]
    pub fn get_frame(&self, frame_id: &str) -> Result<Option<CanvasFrame>> {
        let db = self.db.lock().unwrap();
        row_to_frame_by_id(&db, frame_id).map(Some).or_else(|e| match e {
            CanvasStoreError::NotFound(_) => Ok(None),
            other => Err(other),
        })
    }

    #[instrument(skip(self))]
    pub fn list_frames(&self, canvas_id: &str) -> Result<Vec<CanvasFrame>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, canvas_id, parent_id, name, meta, created_at
             FROM canvas_frames WHERE canvas_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![canvas_id], row_to_frame)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    #[instrument(skip(self))]
    pub fn update_frame(&self, frame_id: &str, name: Option<String>) -> Result<CanvasFrame> {
        let db = self.db.lock().unwrap();
        let Some(new_name) = name else {
            return row_to_frame_by_id(&db, frame_id);
        };
        let changed = db.execute(
            "UPDATE canvas_frames SET name = ?1 WHERE id = ?2",
            params![new_name, frame_id],
        )?;
        if changed == 0 {
            return Err(CanvasStoreError::NotFound(format!("frame {frame_id}")));
        }
        row_to_frame_by_id(&db, frame_id)
    }

    /// Delete a frame, cascading link deletion. Elements themselves persist.
    #[instrument(skip(self))]
    pub fn delete_frame(&self, frame_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM canvas_element_frame_links WHERE frame_id = ?1",
            params![frame_id],
        )?;
        let changed = db.execute("DELETE FROM canvas_frames WHERE id = ?1", params![frame_id])?;
        if changed == 0 {
            return Err(CanvasStoreError::NotFound(format!("frame {frame_id}")));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Elements
    // ---------------------------------------------------------------

    /// Create an element. `content` must be non-empty. When `frame_id` is
    /// given it must belong to `canvas_id` — the element and the link are
    /// created atomically in one transaction.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, content, attributes))]
    pub fn add_element(
        &self,
        canvas_id: &str,
        element_type: &str,
        content: &str,
        created_by: &str,
        attributes: BTreeMap<String, serde_json::Value>,
        frame_id: Option<&str>,
        element_id: Option<&str>,
    ) -> Result<CanvasElement> {
        if content.trim().is_empty() {
            return Err(CanvasStoreError::Validation(
                "element content must not be empty".to_string(),
            ));
        }

        let mut db = self.db.lock().unwrap();

        if let Some(frame) = frame_id {
            require_same_canvas_frame(&db, frame, canvas_id)?;
        }

        let id = element_id
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let now = Utc::now().to_rfc3339();
        let attrs_json = serde_json::to_string(&attributes)?;

        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO canvas_elements
             (id, canvas_id, element_type, name, content, created_by, attributes, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7)",
            params![id, canvas_id, element_type, content, created_by, attrs_json, now],
        )?;
        if let Some(frame) = frame_id {
            tx.execute(
                "INSERT OR IGNORE INTO canvas_element_frame_links (element_id, frame_id)
                 VALUES (?1, ?2)",
                params![id, frame],
            )?;
        }
        tx.commit()?;

        row_to_element_by_id(&db, &id)
    }

    /// Fetch an element with its frame links eagerly materialised.
    #[instrument(skip(self))]
    pub fn get_element(&self, element_id: &str) -> Result<Option<CanvasElement>> {
        let db = self.db.lock().unwrap();
        row_to_element_by_id(&db, element_id)
            .map(Some)
            .or_else(|e| match e {
                CanvasStoreError::NotFound(_) => Ok(None),
                other => Err(other),
            })
    }

    /// Newest-first by `created_at` at the store boundary (spec §9 open
    /// question — callers/tools re-sort as needed).
    #[instrument(skip(self, filter))]
    pub fn get_elements(
        &self,
        canvas_id: &str,
        limit: usize,
        offset: usize,
        filter: &ElementFilter,
    ) -> Result<Vec<CanvasElement>> {
        let db = self.db.lock().unwrap();

        let mut sql = String::from(
            "SELECT DISTINCT e.id FROM canvas_elements e",
        );
        if filter.frame_id.is_some() {
            sql.push_str(" JOIN canvas_element_frame_links l ON l.element_id = e.id");
        }
        sql.push_str(" WHERE e.canvas_id = ?1");
        let mut idx = 1;
        let canvas_id_owned = canvas_id.to_string();
        let mut bind_strings: Vec<String> = vec![canvas_id_owned];

        if let Some(ref t) = filter.element_type {
            idx += 1;
            sql.push_str(&format!(" AND e.element_type = ?{idx}"));
            bind_strings.push(t.clone());
        }
        if let Some(since) = filter.since {
            idx += 1;
            sql.push_str(&format!(" AND e.created_at >= ?{idx}"));
            bind_strings.push(since.to_rfc3339());
        }
        if let Some(until) = filter.until {
            idx += 1;
            sql.push_str(&format!(" AND e.created_at < ?{idx}"));
            bind_strings.push(until.to_rfc3339());
        }
        if let Some(ref f) = filter.frame_id {
            idx += 1;
            sql.push_str(&format!(" AND l.frame_id = ?{idx}"));
            bind_strings.push(f.clone());
        }
        sql.push_str(" ORDER BY e.created_at DESC LIMIT ? OFFSET ?");

        let params_dyn: Vec<&dyn rusqlite::ToSql> = bind_strings
            .iter()
            .map(|s| s as &dyn rusqlite::ToSql)
            .chain(std::iter::once(&limit as &dyn rusqlite::ToSql))
            .chain(std::iter::once(&offset as &dyn rusqlite::ToSql))
            .collect();

        let mut stmt = db.prepare(&sql)?;
        let ids: Vec<String> = stmt
            .query_map(params_dyn.as_slice(), |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();

        let mut elements = Vec::with_capacity(ids.len());
        for id in ids {
            elements.push(row_to_element_by_id(&db, &id)?);
        }
        Ok(elements)
    }

    #[instrument(skip(self, update))]
    pub fn update_element(&self, element_id: &str, update: ElementUpdate) -> Result<CanvasElement> {
        let db = self.db.lock().unwrap();

        let existing = row_to_element_by_id(&db, element_id)?;

        let name = update.name.or(existing.name);
        let content = update.content.unwrap_or(existing.content);
        if content.trim().is_empty() {
            return Err(CanvasStoreError::Validation(
                "element content must not be empty".to_string(),
            ));
        }
        let element_type = update.element_type.unwrap_or(existing.element_type);

        let mut attrs = existing.attributes;
        for key in &update.attributes_remove {
            attrs.remove(key);
        }
        for (k, v) in update.attributes_set {
            attrs.insert(k, v);
        }
        let attrs_json = serde_json::to_string(&attrs)?;

        db.execute(
            "UPDATE canvas_elements
             SET name = ?1, content = ?2, element_type = ?3, attributes = ?4
             WHERE id = ?5",
            params![name, content, element_type, attrs_json, element_id],
        )?;

        row_to_element_by_id(&db, element_id)
    }

    /// Link an element to a frame. Idempotent — a second call is a no-op.
    /// Fails with `CrossCanvas` if they don't share a canvas.
    #[instrument(skip(self))]
    pub fn add_element_to_frame(&self, element_id: &str, frame_id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let element = row_to_element_by_id(&db, element_id)?;
        require_same_canvas_frame(&db, frame_id, &element.canvas_id)?;

        let already_linked: bool = db
            .query_row(
                "SELECT 1 FROM canvas_element_frame_links WHERE element_id = ?1 AND frame_id = ?2",
                params![element_id, frame_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        if already_linked {
            return Ok(false);
        }

        db.execute(
            "INSERT INTO canvas_element_frame_links (element_id, frame_id) VALUES (?1, ?2)",
            params![element_id, frame_id],
        )?;
        Ok(true)
    }

    #[instrument(skip(self))]
    pub fn remove_element_from_frame(&self, element_id: &str, frame_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let element = row_to_element_by_id(&db, element_id)?;
        require_same_canvas_frame(&db, frame_id, &element.canvas_id)?;
        db.execute(
            "DELETE FROM canvas_element_frame_links WHERE element_id = ?1 AND frame_id = ?2",
            params![element_id, frame_id],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Row <-> struct mapping, following the teacher's `row_to_session` idiom.
// ---------------------------------------------------------------------

fn ensure_access_key_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS canvas_access_keys (
            rule       TEXT PRIMARY KEY,
            canvas_id  TEXT NOT NULL
         );",
    )?;
    Ok(())
}

fn lookup_access_key(conn: &Connection, rule: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT canvas_id FROM canvas_access_keys WHERE rule = ?1",
        params![rule],
        |row| row.get(0),
    )
    .optional()
    .map_err(CanvasStoreError::from)
}

fn row_to_canvas_by_id(conn: &Connection, id: &str) -> Result<Canvas> {
    conn.query_row(
        "SELECT id, name, access_rules, created_at FROM canvases WHERE id = ?1",
        params![id],
        |row| {
            let access_rules_json: String = row.get(2)?;
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?, access_rules_json, row.get::<_, String>(3)?))
        },
    )
    .optional()?
    .map(|(id, name, access_rules_json, created_at)| {
        let access_rules: Vec<String> =
            serde_json::from_str(&access_rules_json).unwrap_or_default();
        Canvas { id, name, access_rules, created_at }
    })
    .ok_or_else(|| CanvasStoreError::NotFound(format!("canvas {id}")))
}

fn row_to_frame(row: &rusqlite::Row<'_>) -> rusqlite::Result<CanvasFrame> {
    let meta_json: String = row.get(4)?;
    let meta = serde_json::from_str(&meta_json).unwrap_or_default();
    Ok(CanvasFrame {
        id: row.get(0)?,
        canvas_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        meta,
        created_at: row.get(5)?,
    })
}

fn row_to_frame_by_id(conn: &Connection, id: &str) -> Result<CanvasFrame> {
    conn.query_row(
        "SELECT id, canvas_id, parent_id, name, meta, created_at
         FROM canvas_frames WHERE id = ?1",
        params![id],
        row_to_frame,
    )
    .optional()?
    .ok_or_else(|| CanvasStoreError::NotFound(format!("frame {id}")))
}

fn row_to_element_by_id(conn: &Connection, id: &str) -> Result<CanvasElement> {
    let base = conn
        .query_row(
            "SELECT id, canvas_id, element_type, name, content, created_by, attributes, created_at
             FROM canvas_elements WHERE id = ?1",
            params![id],
            |row| {
                let attrs_json: String = row.get(6)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    attrs_json,
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| CanvasStoreError::NotFound(format!("element {id}")))?;

    let (id, canvas_id, element_type, name, content, created_by, attrs_json, created_at) = base;
    let attributes = serde_json::from_str(&attrs_json).unwrap_or_default();

    let mut stmt = conn.prepare(
        "SELECT frame_id FROM canvas_element_frame_links WHERE element_id = ?1",
    )?;
    let frame_ids: Vec<String> = stmt
        .query_map(params![id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    Ok(CanvasElement {
        id,
        canvas_id,
        element_type,
        name,
        content,
        created_by,
        attributes,
        created_at,
        frame_ids,
    })
}

/// Verify `frame_id` belongs to `canvas_id`; returns `CrossCanvas` otherwise.
/// This is the invariant check spec §3/§8 require before any frame/element
/// cross-reference is written.
fn require_same_canvas_frame(conn: &Connection, frame_id: &str, canvas_id: &str) -> Result<()> {
    let actual_canvas: Option<String> = conn
        .query_row(
            "SELECT canvas_id FROM canvas_frames WHERE id = ?1",
            params![frame_id],
            |row| row.get(0),
        )
        .optional()?;

    match actual_canvas {
        None => Err(CanvasStoreError::NotFound(format!("frame {frame_id}"))),
        Some(actual) if actual != canvas_id => {
            warn!(frame_id, canvas_id, actual_canvas = %actual, "cross-canvas violation");
            Err(CanvasStoreError::CrossCanvas(format!(
                "frame {frame_id} belongs to canvas {actual}, not {canvas_id}"
            )))
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_store() -> CanvasStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        CanvasStore::new(conn)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let store = test_store();
        let c1 = store.get_or_create_canvas_for_chat("42").unwrap();
        let c2 = store.get_or_create_canvas_for_chat("42").unwrap();
        assert_eq!(c1.id, c2.id);
        assert!(c1.access_rules.contains(&"telegram:chat:42".to_string()));
    }

    #[test]
    fn different_chats_get_different_canvases() {
        let store = test_store();
        let c1 = store.get_or_create_canvas_for_chat("1").unwrap();
        let c2 = store.get_or_create_canvas_for_chat("2").unwrap();
        assert_ne!(c1.id, c2.id);
    }

    #[test]
    fn add_element_rejects_empty_content() {
        let store = test_store();
        let canvas = store.get_or_create_canvas_for_chat("1").unwrap();
        let err = store
            .add_element(&canvas.id, "message", "  ", "tester", Default::default(), None, None)
            .unwrap_err();
        assert!(matches!(err, CanvasStoreError::Validation(_)));
    }

    #[test]
    fn add_element_to_frame_is_idempotent() {
        let store = test_store();
        let canvas = store.get_or_create_canvas_for_chat("1").unwrap();
        let frame = store
            .create_frame(&canvas.id, None, "Ideas", Default::default())
            .unwrap();
        let element = store
            .add_element(&canvas.id, "note", "Idea X", "tester", Default::default(), None, None)
            .unwrap();

        let first = store.add_element_to_frame(&element.id, &frame.id).unwrap();
        let second = store.add_element_to_frame(&element.id, &frame.id).unwrap();
        assert!(first);
        assert!(!second);

        let elements = store
            .get_elements(&canvas.id, 10, 0, &ElementFilter { frame_id: Some(frame.id.clone()), ..Default::default() })
            .unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].id, element.id);
    }

    #[test]
    fn cross_canvas_link_rejected() {
        let store = test_store();
        let c1 = store.get_or_create_canvas_for_chat("1").unwrap();
        let c2 = store.get_or_create_canvas_for_chat("2").unwrap();
        let frame2 = store.create_frame(&c2.id, None, "F2", Default::default()).unwrap();
        let element1 = store
            .add_element(&c1.id, "note", "hello", "tester", Default::default(), None, None)
            .unwrap();

        let err = store.add_element_to_frame(&element1.id, &frame2.id).unwrap_err();
        assert!(matches!(err, CanvasStoreError::CrossCanvas(_)));

        // Store unchanged: no link created.
        let elements = store
            .get_elements(&c2.id, 10, 0, &ElementFilter { frame_id: Some(frame2.id), ..Default::default() })
            .unwrap();
        assert!(elements.is_empty());
    }

    #[test]
    fn delete_frame_cascades_links_but_keeps_element() {
        let store = test_store();
        let canvas = store.get_or_create_canvas_for_chat("1").unwrap();
        let frame = store.create_frame(&canvas.id, None, "F", Default::default()).unwrap();
        let element = store
            .add_element(&canvas.id, "note", "content", "tester", Default::default(), Some(&frame.id), None)
            .unwrap();

        store.delete_frame(&frame.id).unwrap();

        assert!(store.get_frame(&frame.id).unwrap().is_none());
        let still_there = store.get_element(&element.id).unwrap().unwrap();
        assert!(still_there.frame_ids.is_empty());
    }

    #[test]
    fn get_elements_newest_first() {
        let store = test_store();
        let canvas = store.get_or_create_canvas_for_chat("1").unwrap();
        let e1 = store
            .add_element(&canvas.id, "note", "first", "t", Default::default(), None, None)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let e2 = store
            .add_element(&canvas.id, "note", "second", "t", Default::default(), None, None)
            .unwrap();

        let elements = store
            .get_elements(&canvas.id, 10, 0, &ElementFilter::default())
            .unwrap();
        assert_eq!(elements[0].id, e2.id);
        assert_eq!(elements[1].id, e1.id);
    }
}
