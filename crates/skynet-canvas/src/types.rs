use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A per-chat workspace — the tenancy root. See spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canvas {
    pub id: String,
    pub name: Option<String>,
    /// Ordered capability strings, e.g. `"telegram:chat:-100123"`.
    pub access_rules: Vec<String>,
    pub created_at: String,
}

/// A named grouping within a canvas; may form a tree via `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasFrame {
    pub id: String,
    pub canvas_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub meta: BTreeMap<String, serde_json::Value>,
    pub created_at: String,
}

/// A unit of content (message, note, voice, image, file, task, …) within a
/// canvas. `element_type` is an open set — no enum, just a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasElement {
    pub id: String,
    pub canvas_id: String,
    pub element_type: String,
    pub name: Option<String>,
    pub content: String,
    pub created_by: String,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub created_at: String,
    /// Frame IDs this element currently belongs to — eagerly materialised so
    /// consumers never need a second lazy-load round-trip (spec §4.1).
    pub frame_ids: Vec<String>,
}

/// Patch for `update_element`: `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ElementUpdate {
    pub name: Option<String>,
    pub content: Option<String>,
    pub element_type: Option<String>,
    pub attributes_set: BTreeMap<String, serde_json::Value>,
    pub attributes_remove: Vec<String>,
}

/// Filters accepted by `get_elements`.
#[derive(Debug, Clone, Default)]
pub struct ElementFilter {
    pub element_type: Option<String>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    /// Exclusive upper bound: `created_at < until`.
    pub until: Option<chrono::DateTime<chrono::Utc>>,
    pub frame_id: Option<String>,
}
