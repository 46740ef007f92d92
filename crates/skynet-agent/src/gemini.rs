use async_trait::async_trait;
use serde_json::json;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, Role, ToolCall};

/// Adapter for Google's Gemini OpenAI-compatible chat completions endpoint —
/// the one concrete vendor this runtime ships with. Any other vendor is a
/// new `LlmProvider` impl; nothing above this module knows about Gemini.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, base_url }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let messages = build_messages(req);
        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
        });

        if !req.tools.is_empty() {
            let tools: Vec<_> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status: status.as_u16(), message });
        }

        let payload: serde_json::Value = resp.json().await.map_err(ProviderError::Http)?;
        parse_response(&payload, &req.model)
    }
}

fn build_messages(req: &ChatRequest) -> Vec<serde_json::Value> {
    if let Some(ref raw) = req.raw_messages {
        let mut out = vec![json!({ "role": "system", "content": req.system })];
        out.extend(raw.iter().cloned());
        return out;
    }

    let mut out = vec![json!({ "role": "system", "content": req.system })];
    out.extend(req.messages.iter().map(|m| {
        let role = match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        json!({ "role": role, "content": m.content })
    }));
    out
}

fn parse_response(payload: &serde_json::Value, model: &str) -> Result<ChatResponse, ProviderError> {
    let choice = payload["choices"]
        .get(0)
        .ok_or_else(|| ProviderError::Parse("response has no choices".to_string()))?;

    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    let id = c["id"].as_str()?.to_string();
                    let name = c["function"]["name"].as_str()?.to_string();
                    let args_str = c["function"]["arguments"].as_str().unwrap_or("{}");
                    let input = serde_json::from_str(args_str).unwrap_or(serde_json::Value::Null);
                    Some(ToolCall { id, name, input })
                })
                .collect()
        })
        .unwrap_or_default();

    let finish_reason = choice["finish_reason"].as_str().unwrap_or("stop");
    let stop_reason = if !tool_calls.is_empty() { "tool_use" } else { finish_reason }.to_string();

    let tokens_in = payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32;
    let tokens_out = payload["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;

    Ok(ChatResponse {
        content,
        model: model.to_string(),
        tokens_in,
        tokens_out,
        stop_reason,
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_extracts_tool_calls() {
        let payload = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "call-1",
                        "function": { "name": "fetch_elements", "arguments": "{\"limit\":5}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 2 }
        });
        let resp = parse_response(&payload, "gemini-1.5-flash").unwrap();
        assert_eq!(resp.stop_reason, "tool_use");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "fetch_elements");
    }

    #[test]
    fn parse_response_plain_text() {
        let payload = json!({
            "choices": [{ "message": { "content": "hello" }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 1 }
        });
        let resp = parse_response(&payload, "gemini-1.5-flash").unwrap();
        assert_eq!(resp.content, "hello");
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.stop_reason, "stop");
    }
}
