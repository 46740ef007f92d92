use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use skynet_canvas::{CanvasStore, ElementUpdate};

use super::{Tool, ToolContext, ToolResult};

/// Build the full set of canvas-operation tools for a given store, all
/// deriving their tenancy (`canvas_id`) from `ToolContext`, never from a
/// tool argument (spec §4.2 invariant (a)).
pub fn canvas_tools(store: Arc<CanvasStore>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetCurrentCanvasInfo { store: store.clone() }),
        Arc::new(SetCanvasName { store: store.clone() }),
        Arc::new(CreateCanvasFrame { store: store.clone() }),
        Arc::new(SetFrameName { store: store.clone() }),
        Arc::new(ListCanvasFrames { store: store.clone() }),
        Arc::new(AddElementToFrame { store: store.clone() }),
        Arc::new(RemoveElementFromFrame { store: store.clone() }),
        Arc::new(SetElementName { store: store.clone() }),
        Arc::new(CreateElement { store: store.clone() }),
        Arc::new(EditElement { store }),
    ]
}

struct GetCurrentCanvasInfo {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for GetCurrentCanvasInfo {
    fn name(&self) -> &str {
        "get_current_canvas_info"
    }
    fn description(&self) -> &str {
        "Return the current chat's canvas id, name, and frame count"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult {
        let canvas = match self.store.get_canvas(&ctx.canvas_id) {
            Ok(Some(c)) => c,
            Ok(None) => return ToolResult::error("canvas not found"),
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let frames = match self.store.list_frames(&ctx.canvas_id) {
            Ok(f) => f,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        ToolResult::success(
            serde_json::json!({ "id": canvas.id, "name": canvas.name, "frame_count": frames.len() })
                .to_string(),
        )
    }
}

#[derive(Deserialize)]
struct SetCanvasNameArgs {
    name: String,
}

struct SetCanvasName {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for SetCanvasName {
    fn name(&self) -> &str {
        "set_canvas_name"
    }
    fn description(&self) -> &str {
        "Rename the current chat's canvas"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": { "name": { "type": "string" } }, "required": ["name"] })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: SetCanvasNameArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        match self.store.update_canvas(&ctx.canvas_id, Some(args.name)) {
            Ok(canvas) => ToolResult::success(format!("canvas renamed to {:?}", canvas.name)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct CreateCanvasFrameArgs {
    name: String,
    parent_id: Option<String>,
}

struct CreateCanvasFrame {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for CreateCanvasFrame {
    fn name(&self) -> &str {
        "create_canvas_frame"
    }
    fn description(&self) -> &str {
        "Create a new frame in the current chat's canvas, optionally nested under a parent frame"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "name": { "type": "string" }, "parent_id": { "type": "string" } },
            "required": ["name"],
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: CreateCanvasFrameArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        match self.store.create_frame(
            &ctx.canvas_id,
            args.parent_id.as_deref(),
            &args.name,
            BTreeMap::new(),
        ) {
            Ok(frame) => ToolResult::success(serde_json::json!({ "id": frame.id, "name": frame.name }).to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct SetFrameNameArgs {
    frame_id: String,
    name: String,
}

struct SetFrameName {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for SetFrameName {
    fn name(&self) -> &str {
        "set_frame_name"
    }
    fn description(&self) -> &str {
        "Rename a frame in the current chat's canvas"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "frame_id": { "type": "string" }, "name": { "type": "string" } },
            "required": ["frame_id", "name"],
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: SetFrameNameArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        match self.store.get_frame(&args.frame_id) {
            Ok(Some(f)) if f.canvas_id != ctx.canvas_id => {
                return ToolResult::error("frame does not belong to this chat's canvas");
            }
            Ok(None) => return ToolResult::error("frame not found"),
            Err(e) => return ToolResult::error(e.to_string()),
            Ok(Some(_)) => {}
        }
        match self.store.update_frame(&args.frame_id, Some(args.name)) {
            Ok(frame) => ToolResult::success(format!("frame renamed to {:?}", frame.name)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

struct ListCanvasFrames {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for ListCanvasFrames {
    fn name(&self) -> &str {
        "list_canvas_frames"
    }
    fn description(&self) -> &str {
        "List all frames in the current chat's canvas"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult {
        match self.store.list_frames(&ctx.canvas_id) {
            Ok(frames) => {
                let payload: Vec<_> = frames
                    .iter()
                    .map(|f| serde_json::json!({ "id": f.id, "name": f.name, "parent_id": f.parent_id }))
                    .collect();
                ToolResult::success(serde_json::to_string(&payload).unwrap_or_default())
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct FrameElementArgs {
    element_id: String,
    frame_id: String,
}

/// Verify both the element and the frame belong to the calling chat's
/// canvas before letting a store call relate them to each other — the
/// store only checks they share a canvas *with each other*, not with
/// `ctx.canvas_id` (spec §4.2, §9: tenancy derives from context, never
/// from arguments).
fn check_same_canvas(
    store: &CanvasStore,
    element_id: &str,
    frame_id: &str,
    canvas_id: &str,
) -> Result<(), ToolResult> {
    match store.get_element(element_id) {
        Ok(Some(e)) if e.canvas_id != canvas_id => {
            return Err(ToolResult::error("element does not belong to this chat's canvas"));
        }
        Ok(None) => return Err(ToolResult::error("element not found")),
        Err(e) => return Err(ToolResult::error(e.to_string())),
        Ok(Some(_)) => {}
    }
    match store.get_frame(frame_id) {
        Ok(Some(f)) if f.canvas_id != canvas_id => {
            return Err(ToolResult::error("frame does not belong to this chat's canvas"));
        }
        Ok(None) => return Err(ToolResult::error("frame not found")),
        Err(e) => return Err(ToolResult::error(e.to_string())),
        Ok(Some(_)) => {}
    }
    Ok(())
}

struct AddElementToFrame {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for AddElementToFrame {
    fn name(&self) -> &str {
        "add_element_to_frame"
    }
    fn description(&self) -> &str {
        "Link an existing element to a frame in the current chat's canvas (idempotent)"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "element_id": { "type": "string" }, "frame_id": { "type": "string" } },
            "required": ["element_id", "frame_id"],
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: FrameElementArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        if let Err(e) = check_same_canvas(&self.store, &args.element_id, &args.frame_id, &ctx.canvas_id) {
            return e;
        }
        match self.store.add_element_to_frame(&args.element_id, &args.frame_id) {
            Ok(true) => ToolResult::success("linked"),
            Ok(false) => ToolResult::success("already linked"),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

struct RemoveElementFromFrame {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for RemoveElementFromFrame {
    fn name(&self) -> &str {
        "remove_element_from_frame"
    }
    fn description(&self) -> &str {
        "Unlink an element from a frame in the current chat's canvas"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "element_id": { "type": "string" }, "frame_id": { "type": "string" } },
            "required": ["element_id", "frame_id"],
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: FrameElementArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        if let Err(e) = check_same_canvas(&self.store, &args.element_id, &args.frame_id, &ctx.canvas_id) {
            return e;
        }
        match self.store.remove_element_from_frame(&args.element_id, &args.frame_id) {
            Ok(()) => ToolResult::success("unlinked"),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct SetElementNameArgs {
    element_id: String,
    name: String,
}

struct SetElementName {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for SetElementName {
    fn name(&self) -> &str {
        "set_element_name"
    }
    fn description(&self) -> &str {
        "Rename an element in the current chat's canvas"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "element_id": { "type": "string" }, "name": { "type": "string" } },
            "required": ["element_id", "name"],
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: SetElementNameArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        match self.store.get_element(&args.element_id) {
            Ok(Some(e)) if e.canvas_id != ctx.canvas_id => {
                return ToolResult::error("element does not belong to this chat's canvas");
            }
            Ok(None) => return ToolResult::error("element not found"),
            Err(e) => return ToolResult::error(e.to_string()),
            Ok(Some(_)) => {}
        }
        let update = ElementUpdate { name: Some(args.name), ..Default::default() };
        match self.store.update_element(&args.element_id, update) {
            Ok(e) => ToolResult::success(format!("element renamed to {:?}", e.name)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct CreateElementArgs {
    content: String,
    created_by: String,
    #[serde(rename = "type")]
    element_type: Option<String>,
    attributes: Option<BTreeMap<String, serde_json::Value>>,
    frame_id: Option<String>,
}

struct CreateElement {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for CreateElement {
    fn name(&self) -> &str {
        "create_element"
    }
    fn description(&self) -> &str {
        "Create a new element (note, task, etc.) in the current chat's canvas"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "created_by": { "type": "string" },
                "type": { "type": "string" },
                "attributes": { "type": "object" },
                "frame_id": { "type": "string" },
            },
            "required": ["content", "created_by"],
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: CreateElementArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        let element_type = args.element_type.unwrap_or_else(|| "note".to_string());
        match self.store.add_element(
            &ctx.canvas_id,
            &element_type,
            &args.content,
            &args.created_by,
            args.attributes.unwrap_or_default(),
            args.frame_id.as_deref(),
            None,
        ) {
            Ok(element) => ToolResult::success(serde_json::json!({ "id": element.id }).to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[derive(Deserialize, Default)]
struct EditElementArgs {
    element_id: String,
    content: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    element_type: Option<String>,
    attributes_set: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    attributes_remove: Vec<String>,
}

struct EditElement {
    store: Arc<CanvasStore>,
}

#[async_trait]
impl Tool for EditElement {
    fn name(&self) -> &str {
        "edit_element"
    }
    fn description(&self) -> &str {
        "Patch an existing element's content, name, type, or attributes"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "element_id": { "type": "string" },
                "content": { "type": "string" },
                "name": { "type": "string" },
                "type": { "type": "string" },
                "attributes_set": { "type": "object" },
                "attributes_remove": { "type": "array", "items": { "type": "string" } },
            },
            "required": ["element_id"],
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: EditElementArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        match self.store.get_element(&args.element_id) {
            Ok(Some(e)) if e.canvas_id != ctx.canvas_id => {
                return ToolResult::error("element does not belong to this chat's canvas");
            }
            Ok(None) => return ToolResult::error("element not found"),
            Err(e) => return ToolResult::error(e.to_string()),
            Ok(Some(_)) => {}
        }
        let update = ElementUpdate {
            name: args.name,
            content: args.content,
            element_type: args.element_type,
            attributes_set: args.attributes_set.unwrap_or_default(),
            attributes_remove: args.attributes_remove,
        };
        match self.store.update_element(&args.element_id, update) {
            Ok(_) => ToolResult::success("element updated"),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tokio_util::sync::CancellationToken;

    fn test_store() -> Arc<CanvasStore> {
        let conn = Connection::open_in_memory().unwrap();
        skynet_canvas::db::init_db(&conn).unwrap();
        Arc::new(CanvasStore::new(conn))
    }

    fn ctx_for(canvas_id: &str) -> ToolContext {
        ToolContext {
            chat_id: "irrelevant".to_string(),
            user_id: "irrelevant".to_string(),
            canvas_id: canvas_id.to_string(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn add_element_to_frame_rejects_when_both_belong_to_a_different_canvas() {
        let store = test_store();
        let owning_canvas = store.get_or_create_canvas_for_chat("owner-chat").unwrap();
        let attacker_canvas = store.get_or_create_canvas_for_chat("attacker-chat").unwrap();

        let frame = store.create_frame(&owning_canvas.id, None, "F", Default::default()).unwrap();
        let element = store
            .add_element(&owning_canvas.id, "note", "secret", "tester", Default::default(), None, None)
            .unwrap();

        let tool = AddElementToFrame { store: store.clone() };
        let input = serde_json::json!({ "element_id": element.id, "frame_id": frame.id });

        // A tool call scoped to attacker_canvas must not be able to relate
        // two rows that both belong to owning_canvas, even though the
        // store's own cross-canvas check (element vs. frame) passes.
        let result = tool.execute(&ctx_for(&attacker_canvas.id), input).await;
        assert!(result.is_error);
        assert!(result.content.contains("does not belong to this chat's canvas"));

        let links = store
            .get_elements(
                &owning_canvas.id,
                10,
                0,
                &skynet_canvas::ElementFilter { frame_id: Some(frame.id.clone()), ..Default::default() },
            )
            .unwrap();
        assert!(links.is_empty(), "store must be unchanged after a rejected cross-tenant call");
    }

    #[tokio::test]
    async fn remove_element_from_frame_rejects_cross_tenant_call() {
        let store = test_store();
        let owning_canvas = store.get_or_create_canvas_for_chat("owner-chat").unwrap();
        let attacker_canvas = store.get_or_create_canvas_for_chat("attacker-chat").unwrap();

        let frame = store.create_frame(&owning_canvas.id, None, "F", Default::default()).unwrap();
        let element = store
            .add_element(&owning_canvas.id, "note", "secret", "tester", Default::default(), None, None)
            .unwrap();
        store.add_element_to_frame(&element.id, &frame.id).unwrap();

        let tool = RemoveElementFromFrame { store: store.clone() };
        let input = serde_json::json!({ "element_id": element.id, "frame_id": frame.id });

        let result = tool.execute(&ctx_for(&attacker_canvas.id), input).await;
        assert!(result.is_error);

        let links = store
            .get_elements(
                &owning_canvas.id,
                10,
                0,
                &skynet_canvas::ElementFilter { frame_id: Some(frame.id.clone()), ..Default::default() },
            )
            .unwrap();
        assert_eq!(links.len(), 1, "rejected call must not have unlinked the element");
    }

    #[tokio::test]
    async fn add_element_to_frame_succeeds_for_the_owning_canvas() {
        let store = test_store();
        let canvas = store.get_or_create_canvas_for_chat("owner-chat").unwrap();
        let frame = store.create_frame(&canvas.id, None, "F", Default::default()).unwrap();
        let element = store
            .add_element(&canvas.id, "note", "hello", "tester", Default::default(), None, None)
            .unwrap();

        let tool = AddElementToFrame { store: store.clone() };
        let input = serde_json::json!({ "element_id": element.id, "frame_id": frame.id });

        let result = tool.execute(&ctx_for(&canvas.id), input).await;
        assert!(!result.is_error);
    }
}
