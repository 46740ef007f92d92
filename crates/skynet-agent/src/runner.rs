use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Map;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use skynet_canvas::CanvasStore;
use skynet_sessions::{SessionKey, SessionManager};

use crate::agent_def::Agent;
use crate::error::{AgentError, Result};
use crate::provider::{ChatRequest, LlmProvider, Message, Role};
use crate::tools::{run_tool_loop, to_definitions, Tool, ToolContext, ToolResult};

/// Recommended whole-turn deadline (spec §5).
pub const DEFAULT_TURN_DEADLINE: Duration = Duration::from_secs(120);

/// Outcome of one completed turn.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Text(String),
    /// "No response" sentinel — callers may render as silence (spec §4.5 step 5).
    Silent,
}

/// Central agent runtime: owns the session store, canvas store, LLM
/// provider, and the agent tree, and drives one turn at a time per session.
pub struct Runner {
    app_name: String,
    sessions: Arc<SessionManager>,
    canvas: Arc<CanvasStore>,
    provider: Arc<dyn LlmProvider>,
    root_agent: Arc<Agent>,
    session_locks: DashMap<SessionKey, Arc<AsyncMutex<()>>>,
    active_turns: DashMap<String, CancellationToken>,
    turn_deadline: Duration,
}

impl Runner {
    pub fn new(
        app_name: impl Into<String>,
        sessions: Arc<SessionManager>,
        canvas: Arc<CanvasStore>,
        provider: Arc<dyn LlmProvider>,
        root_agent: Arc<Agent>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            sessions,
            canvas,
            provider,
            root_agent,
            session_locks: DashMap::new(),
            active_turns: DashMap::new(),
            turn_deadline: DEFAULT_TURN_DEADLINE,
        }
    }

    /// Request cancellation of an in-flight turn for `chat_id`, mirroring
    /// the teacher's `active_operations` / `/stop` mechanism.
    pub fn cancel(&self, chat_id: &str) -> bool {
        match self.active_turns.get(chat_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn session_lock(&self, key: &SessionKey) -> Arc<AsyncMutex<()>> {
        self.session_locks.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Execute one conversational turn: `(agent, user_message, user_id,
    /// chat_id)` → final text, per spec §4.5's algorithm. `is_forward`
    /// reports whether the inbound message was a forward (spec §4.6) so the
    /// orchestrator can apply its silence rule for non-voice forwards.
    #[instrument(skip(self, user_message), fields(chat_id, user_id))]
    pub async fn run_turn(&self, user_id: &str, chat_id: &str, user_message: &str) -> Result<TurnOutcome> {
        self.run_turn_with_forward(user_id, chat_id, user_message, false).await
    }

    pub async fn run_turn_with_forward(
        &self,
        user_id: &str,
        chat_id: &str,
        user_message: &str,
        is_forward: bool,
    ) -> Result<TurnOutcome> {
        let key = SessionKey::new(self.app_name.clone(), user_id.to_string(), chat_id.to_string());
        let lock = self.session_lock(&key);
        let _guard = lock.lock().await;

        let cancel = CancellationToken::new();
        self.active_turns.insert(chat_id.to_string(), cancel.clone());

        let result = tokio::time::timeout(
            self.turn_deadline,
            self.run_turn_inner(&key, chat_id, user_message, is_forward, &cancel),
        )
        .await;

        self.active_turns.remove(chat_id);

        match result {
            Ok(inner) => inner,
            Err(_) => {
                warn!(chat_id, "turn deadline exceeded");
                self.sessions
                    .append_event(&key, "cancelled", serde_json::json!({ "reason": "deadline_exceeded" }))
                    .ok();
                Err(AgentError::DeadlineExceeded)
            }
        }
    }

    async fn run_turn_inner(
        &self,
        key: &SessionKey,
        chat_id: &str,
        user_message: &str,
        is_forward: bool,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        // 1. Session resolution — the only place a session may be created.
        let session = self.sessions.get_or_create(key)?;
        if session.chat_id().is_none() {
            let mut patch = Map::new();
            patch.insert("chat_id".to_string(), serde_json::Value::String(chat_id.to_string()));
            self.sessions.update_state(key, patch)?;
        }

        self.sessions.append_event(
            key,
            "user_message",
            serde_json::json!({ "text": user_message }),
        )?;

        let canvas = self.canvas.get_or_create_canvas_for_chat(chat_id)?;

        let ctx = ToolContext {
            chat_id: chat_id.to_string(),
            user_id: key.user_id.clone(),
            canvas_id: canvas.id.clone(),
            cancel: cancel.clone(),
        };

        // 2. Context injection — an invisible header carrying chat_id so no
        // tool ever has to be told (or trusted) to guess its tenant, plus
        // is_forward so the orchestrator's silence rule (spec §4.6) has
        // something to key off.
        let context_header = format!(
            "[context] chat_id={} canvas_id={} is_forward={}",
            chat_id,
            canvas.id,
            if is_forward { 1 } else { 0 },
        );
        let user_content = format!("{context_header}\n\n{user_message}");

        let tools = effective_tools(&self.root_agent, self.provider.clone());
        let request = ChatRequest {
            model: self.root_agent.model_handle.clone(),
            system: self.root_agent.instruction.clone(),
            messages: vec![Message { role: Role::User, content: user_content }],
            max_tokens: 4096,
            tools: to_definitions(&tools),
            raw_messages: None,
        };

        // 3. Tool-call loop (delegated sub-turns collapse into a tool call
        // on a SubAgentTool wrapper — see its doc comment).
        let response = run_tool_loop(&*self.provider, request, &tools, &ctx).await?;

        self.sessions.append_event(
            key,
            "agent_reply",
            serde_json::json!({ "text": response.content, "model": response.model }),
        )?;

        if response.content.trim().is_empty() {
            return Ok(TurnOutcome::Silent);
        }
        Ok(TurnOutcome::Text(response.content))
    }
}

/// Flatten `agent`'s own tools with a `SubAgentTool` wrapper per declared
/// sub-agent (both plain `sub_agents` and `tool_shaped_sub_agents`) so the
/// dispatcher and the model see one uniform callable surface.
fn effective_tools(agent: &Arc<Agent>, provider: Arc<dyn LlmProvider>) -> Vec<Arc<dyn Tool>> {
    let mut tools = agent.tools.clone();
    for child in agent.sub_agents.iter().chain(agent.tool_shaped_sub_agents.iter()) {
        tools.push(Arc::new(SubAgentTool { agent: child.clone(), provider: provider.clone() }));
    }
    tools
}

/// Wraps a sub-agent so the parent's LLM sees it as a single callable tool.
///
/// This collapses the spec's two sub-agent invocation styles — "delegated
/// sub-turn" and "tool-shaped agent" — into one mechanism: calling it runs
/// the child's own tool loop to completion and returns its final text,
/// which is observably identical to a delegated transfer from the parent's
/// point of view in an async tool-calling runtime.
struct SubAgentTool {
    agent: Arc<Agent>,
    provider: Arc<dyn LlmProvider>,
}

#[async_trait]
impl Tool for SubAgentTool {
    fn name(&self) -> &str {
        &self.agent.name
    }

    fn description(&self) -> &str {
        &self.agent.description
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let message = input.get("message").and_then(|v| v.as_str()).unwrap_or_default();
        let child_tools = effective_tools(&self.agent, self.provider.clone());
        let request = ChatRequest {
            model: self.agent.model_handle.clone(),
            system: self.agent.instruction.clone(),
            messages: vec![Message { role: Role::User, content: message.to_string() }],
            max_tokens: 4096,
            tools: to_definitions(&child_tools),
            raw_messages: None,
        };

        info!(sub_agent = %self.agent.name, "delegating to sub-agent");
        match run_tool_loop(&*self.provider, request, &child_tools, ctx).await {
            Ok(response) => ToolResult::success(response.content),
            Err(e) => ToolResult::error(format!("sub-agent {} failed: {e}", self.agent.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_def::build_canonical_tree;
    use crate::mock::MockLlmProvider;
    use rusqlite::Connection;

    fn setup() -> (Arc<SessionManager>, Arc<CanvasStore>) {
        let session_conn = Connection::open_in_memory().unwrap();
        skynet_sessions::db::init_db(&session_conn).unwrap();
        let canvas_conn = Connection::open_in_memory().unwrap();
        skynet_canvas::db::init_db(&canvas_conn).unwrap();
        (Arc::new(SessionManager::new(session_conn)), Arc::new(CanvasStore::new(canvas_conn)))
    }

    #[tokio::test]
    async fn run_turn_creates_session_and_returns_text() {
        let (sessions, canvas) = setup();
        let provider: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::text("Hello there"));
        let tree = build_canonical_tree("mock-model", Vec::new(), Vec::new(), Vec::new()).unwrap();
        let runner = Runner::new("canvas-runtime", sessions.clone(), canvas, provider, tree);

        let outcome = runner.run_turn("user-1", "chat-1", "hi").await.unwrap();
        match outcome {
            TurnOutcome::Text(text) => assert_eq!(text, "Hello there"),
            TurnOutcome::Silent => panic!("expected text"),
        }

        let key = SessionKey::new("canvas-runtime", "user-1", "chat-1");
        let session = sessions.get(&key).unwrap().unwrap();
        assert_eq!(session.chat_id(), Some("chat-1"));
    }

    #[tokio::test]
    async fn run_turn_is_idempotent_on_session_creation() {
        let (sessions, canvas) = setup();
        let provider: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::text("ok"));
        let tree = build_canonical_tree("mock-model", Vec::new(), Vec::new(), Vec::new()).unwrap();
        let runner = Runner::new("canvas-runtime", sessions.clone(), canvas, provider, tree);

        runner.run_turn("user-1", "chat-1", "first").await.unwrap();

        let key = SessionKey::new("canvas-runtime", "user-1", "chat-1");
        let events = sessions.list_events(&key, None).unwrap();
        // user_message + agent_reply for the one turn run above.
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn empty_reply_yields_silent_outcome() {
        let (sessions, canvas) = setup();
        let provider: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::text(""));
        let tree = build_canonical_tree("mock-model", Vec::new(), Vec::new(), Vec::new()).unwrap();
        let runner = Runner::new("canvas-runtime", sessions, canvas, provider, tree);

        let outcome = runner.run_turn("user-1", "chat-1", "hi").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Silent));
    }

    #[tokio::test]
    async fn forwarded_turn_reports_is_forward_in_context_header() {
        let (sessions, canvas) = setup();
        let provider = Arc::new(MockLlmProvider::text(""));
        let tree = build_canonical_tree("mock-model", Vec::new(), Vec::new(), Vec::new()).unwrap();
        let runner = Runner::new("canvas-runtime", sessions, canvas, provider.clone(), tree);

        let outcome = runner.run_turn_with_forward("user-1", "chat-1", "fwd text", true).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Silent));

        let sent = provider.requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].messages[0].content.contains("is_forward=1"));
    }

    #[tokio::test]
    async fn non_forwarded_turn_reports_is_forward_zero() {
        let (sessions, canvas) = setup();
        let provider = Arc::new(MockLlmProvider::text("hi"));
        let tree = build_canonical_tree("mock-model", Vec::new(), Vec::new(), Vec::new()).unwrap();
        let runner = Runner::new("canvas-runtime", sessions, canvas, provider.clone(), tree);

        runner.run_turn("user-1", "chat-1", "hello").await.unwrap();

        let sent = provider.requests();
        assert!(sent[0].messages[0].content.contains("is_forward=0"));
    }
}
