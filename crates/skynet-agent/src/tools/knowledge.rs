//! Knowledge tools — `search_knowledge_base` and `fetch_documents`.
//!
//! The actual vector database and chunker are out of scope for this system
//! (see the ingestion pipeline's non-goals); what lives here is the
//! `VectorStore` collaborator contract the tools dispatch through, plus a
//! no-op stub implementation so the tools are wired and testable without a
//! real embedding backend. A production deployment swaps in a real
//! `VectorStore` impl without touching these tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Tool, ToolContext, ToolResult};

/// A single retrieved document/chunk, scoped to one chat's knowledge base.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub score: f32,
}

/// External collaborator contract for semantic search over a chat's
/// ingested documents. Every method takes `chat_id` explicitly so the
/// implementation can enforce tenancy at the query layer, independent of
/// whatever the tool layer already enforces.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, chat_id: &str, query: &str, limit: usize) -> Vec<KnowledgeDocument>;
    async fn fetch_documents(&self, chat_id: &str, tags: &[String], limit: usize) -> Vec<KnowledgeDocument>;
}

/// No-op stand-in used until a real vector store is wired up. Always
/// returns an empty result set rather than failing, so the tools remain
/// safe to register in agents even before that backend exists.
pub struct NullVectorStore;

#[async_trait]
impl VectorStore for NullVectorStore {
    async fn search(&self, _chat_id: &str, _query: &str, _limit: usize) -> Vec<KnowledgeDocument> {
        Vec::new()
    }

    async fn fetch_documents(&self, _chat_id: &str, _tags: &[String], _limit: usize) -> Vec<KnowledgeDocument> {
        Vec::new()
    }
}

pub fn knowledge_tools(store: Arc<dyn VectorStore>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(SearchKnowledgeBase { store: store.clone() }),
        Arc::new(FetchDocuments { store }),
    ]
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

struct SearchKnowledgeBase {
    store: Arc<dyn VectorStore>,
}

#[async_trait]
impl Tool for SearchKnowledgeBase {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }
    fn description(&self) -> &str {
        "Semantically search this chat's ingested documents for relevant passages"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"],
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: SearchArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        // chat_id always comes from context, never from the model's arguments.
        let docs = self.store.search(&ctx.chat_id, &args.query, 5).await;
        match serde_json::to_string(&docs) {
            Ok(json) => ToolResult::success(json),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[derive(Deserialize, Default)]
struct FetchDocumentsArgs {
    #[serde(default)]
    tags: Vec<String>,
    limit: Option<usize>,
}

struct FetchDocuments {
    store: Arc<dyn VectorStore>,
}

#[async_trait]
impl Tool for FetchDocuments {
    fn name(&self) -> &str {
        "fetch_documents"
    }
    fn description(&self) -> &str {
        "List this chat's ingested documents, optionally filtered by tags"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tags": { "type": "array", "items": { "type": "string" } },
                "limit": { "type": "integer" },
            },
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: FetchDocumentsArgs = serde_json::from_value(input).unwrap_or_default();
        let docs = self
            .store
            .fetch_documents(&ctx.chat_id, &args.tags, args.limit.unwrap_or(20))
            .await;
        match serde_json::to_string(&docs) {
            Ok(json) => ToolResult::success(json),
            Err(e) => ToolResult::error(e.to_string()),
        }
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
    async fn null_store_returns_empty_results() {
        let tools = knowledge_tools(Arc::new(NullVectorStore));
        let search = &tools[0];
        let result = search
            .execute(&ctx(), serde_json::json!({ "query": "anything" }))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "[]");
    }
}
