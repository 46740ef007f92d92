use std::sync::Mutex;

use async_trait::async_trait;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

/// Scripted provider for runtime tests — returns queued responses in order,
/// mirroring the teacher's pattern of a test-only `LlmProvider` impl rather
/// than hitting a real vendor in unit tests.
pub struct MockLlmProvider {
    responses: Mutex<Vec<Result<ChatResponse, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<Result<ChatResponse, ProviderError>>) -> Self {
        Self { responses: Mutex::new(responses), requests: Mutex::new(Vec::new()) }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(vec![Ok(ChatResponse {
            content: content.into(),
            model: "mock".to_string(),
            tokens_in: 0,
            tokens_out: 0,
            stop_reason: "stop".to_string(),
            tool_calls: Vec::new(),
        })])
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().unwrap().push(req.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ProviderError::Parse("mock provider exhausted".to_string()));
        }
        responses.remove(0)
    }
}
