//! Administrative tools — version status, codebase update, restart, logs.
//!
//! Gated by an environment flag at construction time rather than per-call,
//! since whether these are available at all is a deployment decision, not
//! a per-turn one. When disabled every tool still registers (so the model
//! sees a consistent schema) but refuses at execution time.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Tool, ToolContext, ToolResult};

pub fn admin_tools(enabled: bool) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(CheckVersionStatus { enabled }),
        Arc::new(UpdateCodebase { enabled }),
        Arc::new(RestartApplication { enabled }),
        Arc::new(GetRecentLogs { enabled }),
    ]
}

fn guard(enabled: bool) -> Option<ToolResult> {
    if enabled {
        None
    } else {
        Some(ToolResult::error("administrative tools are disabled for this deployment"))
    }
}

struct CheckVersionStatus {
    enabled: bool,
}

#[async_trait]
impl Tool for CheckVersionStatus {
    fn name(&self) -> &str {
        "check_version_status"
    }
    fn description(&self) -> &str {
        "Report the running build version and whether an update is available"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    async fn execute(&self, _ctx: &ToolContext, _input: serde_json::Value) -> ToolResult {
        if let Some(err) = guard(self.enabled) {
            return err;
        }
        ToolResult::success(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }).to_string())
    }
}

struct UpdateCodebase {
    enabled: bool,
}

#[async_trait]
impl Tool for UpdateCodebase {
    fn name(&self) -> &str {
        "update_codebase"
    }
    fn description(&self) -> &str {
        "Pull and build the latest deployed revision"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    async fn execute(&self, _ctx: &ToolContext, _input: serde_json::Value) -> ToolResult {
        if let Some(err) = guard(self.enabled) {
            return err;
        }
        ToolResult::error("update_codebase requires an operator-configured deploy hook")
    }
}

struct RestartApplication {
    enabled: bool,
}

#[async_trait]
impl Tool for RestartApplication {
    fn name(&self) -> &str {
        "restart_application"
    }
    fn description(&self) -> &str {
        "Restart the running process"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    async fn execute(&self, _ctx: &ToolContext, _input: serde_json::Value) -> ToolResult {
        if let Some(err) = guard(self.enabled) {
            return err;
        }
        ToolResult::error("restart_application requires an operator-configured process supervisor")
    }
}

struct GetRecentLogs {
    enabled: bool,
}

#[async_trait]
impl Tool for GetRecentLogs {
    fn name(&self) -> &str {
        "get_recent_logs"
    }
    fn description(&self) -> &str {
        "Return the most recent log lines"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": { "lines": { "type": "integer" } } })
    }
    async fn execute(&self, _ctx: &ToolContext, _input: serde_json::Value) -> ToolResult {
        if let Some(err) = guard(self.enabled) {
            return err;
        }
        ToolResult::error("get_recent_logs requires an operator-configured log sink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ToolContext {
        ToolContext {
            chat_id: "42".to_string(),
            user_id: "u1".to_string(),
            canvas_id: "c1".to_string(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn disabled_admin_tools_refuse() {
        let tools = admin_tools(false);
        for tool in &tools {
            let result = tool.execute(&ctx(), serde_json::json!({})).await;
            assert!(result.is_error);
        }
    }

    #[tokio::test]
    async fn version_status_reports_when_enabled() {
        let tools = admin_tools(true);
        let version_tool = &tools[0];
        let result = version_tool.execute(&ctx(), serde_json::json!({})).await;
        assert!(!result.is_error);
    }
}
