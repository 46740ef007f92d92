//! Tool system for agent tool calling.
//!
//! Defines the `Tool` trait every tool implements, the `ToolContext` every
//! tool derives its tenancy from, and the tool-call loop.

pub mod admin;
pub mod canvas;
pub mod history;
pub mod knowledge;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ToolCall, ToolDefinition};

const LOG_TRUNCATE_WIDTH: usize = 200;
const MAX_ITERATIONS: usize = 25;

/// Result of executing a tool. Content always goes to the model untruncated;
/// only the logged copy is shortened (spec §4.2 invariant (c)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { content: format!("Error: {}", message.into()), is_error: true }
    }
}

/// Context threaded into every tool call. `chat_id` is the only source of
/// tenancy a tool may use — arguments must never override it.
#[derive(Clone)]
pub struct ToolContext {
    pub chat_id: String,
    pub user_id: String,
    pub canvas_id: String,
    pub cancel: CancellationToken,
}

/// Trait every tool implements. Every method is synchronous metadata except
/// `execute`, which is async — in this implementation there is no
/// synchronous façade to bridge (spec §4.2's "Async bridging" resolution):
/// the whole Runner is async end-to-end, so dispatch is an ordinary `.await`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult;
}

pub fn to_definitions(tools: &[Arc<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

fn truncate_for_log(s: &str) -> String {
    if s.len() <= LOG_TRUNCATE_WIDTH {
        s.to_string()
    } else {
        format!("{}…", &s[..LOG_TRUNCATE_WIDTH])
    }
}

/// Run the tool execution loop: prompt → LLM → if tool_use, execute tools,
/// splice results back → LLM → repeat. Stops when `stop_reason` is not
/// `"tool_use"`, the iteration cap is hit, or the call is cancelled.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    initial_request: ChatRequest,
    tools: &[Arc<dyn Tool>],
    ctx: &ToolContext,
) -> Result<ChatResponse, AgentError> {
    let mut raw_messages: Vec<serde_json::Value> = if let Some(ref raw) = initial_request.raw_messages {
        raw.clone()
    } else {
        initial_request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect()
    };

    for iteration in 0..MAX_ITERATIONS {
        if ctx.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(iteration, "tool loop iteration");

        let response = crate::retry::call_with_retry(&req.model, &ctx.cancel, || provider.send(&req)).await?;

        if response.tool_calls.is_empty() || response.stop_reason != "tool_use" {
            info!(iteration, "tool loop complete");
            return Ok(response);
        }

        let mut assistant_content: Vec<serde_json::Value> = Vec::new();
        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({ "type": "text", "text": response.content }));
        }
        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use", "id": call.id, "name": call.name, "input": call.input,
            }));
        }
        raw_messages.push(serde_json::json!({ "role": "assistant", "content": assistant_content }));

        let mut tool_result_content: Vec<serde_json::Value> = Vec::new();
        for call in &response.tool_calls {
            let result = execute_tool(tools, ctx, call).await;
            tool_result_content.push(serde_json::json!({
                "type": "tool_result", "tool_use_id": call.id,
                "content": result.content, "is_error": result.is_error,
            }));
        }
        raw_messages.push(serde_json::json!({ "role": "user", "content": tool_result_content }));
    }

    warn!(max_iterations = MAX_ITERATIONS, "tool loop hit maximum iterations");
    Err(AgentError::Validation(format!(
        "tool loop exceeded {MAX_ITERATIONS} iterations without a final response"
    )))
}

async fn execute_tool(tools: &[Arc<dyn Tool>], ctx: &ToolContext, call: &ToolCall) -> ToolResult {
    match tools.iter().find(|t| t.name() == call.name) {
        Some(tool) => {
            let args_log = truncate_for_log(&call.input.to_string());
            let result = tool.execute(ctx, call.input.clone()).await;
            info!(
                tool = %call.name,
                args = %args_log,
                result = %truncate_for_log(&result.content),
                is_error = result.is_error,
                "tool executed"
            );
            result
        }
        None => ToolResult::error(format!("unknown tool: {}", call.name)),
    }
}
