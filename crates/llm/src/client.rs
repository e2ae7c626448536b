//! OpenAI-compatible chat transport.
//!
//! One shared `reqwest::Client` per process; the struct is cheap to clone
//! and safe to share across request handlers by `Arc`.

use serde_json::json;
use tracing::debug;

use valet_config::LlmConfig;

use crate::{
    ChatMessage, ChatModel, ChatRole, CompletionOptions, LlmError, ModelTurn, ToolCall,
    ToolCallFunction,
};

/// Env var holding the provider API key. Read per request so key rotation
/// does not require a restart.
const API_KEY_ENV: &str = "VALET_LLM_API_KEY";

#[derive(Debug, Clone)]
pub struct HttpChatModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpChatModel {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn api_key() -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[async_trait::async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ModelTurn, LlmError> {
        let Some(api_key) = Self::api_key() else {
            return Err(LlmError::Transport(format!(
                "missing API key: set {API_KEY_ENV}"
            )));
        };

        let mut payload = json!({
            "model": self.model,
            "messages": messages_to_wire(messages),
        });
        if let Some(ref tools) = options.tools {
            payload["tools"] = tools.clone();
        }
        if let Some(ref schema) = options.response_schema {
            payload["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {"name": "response", "schema": schema},
            });
        }

        let endpoint = format!("{}/chat/completions", self.base_url);
        debug!(endpoint = %endpoint, msg_count = messages.len(), "chat completion request");

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Provider {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        parse_completion(&body)
    }
}

/// Convert our `ChatMessage` array to the wire message format.
fn messages_to_wire(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::Tool => "tool",
            };
            let mut msg = json!({ "role": role, "content": m.content });
            if !m.tool_calls.is_empty() {
                let calls: Vec<serde_json::Value> = m
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.function.name,
                                // wire format wants arguments as a JSON string
                                "arguments": tc.function.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                msg["tool_calls"] = json!(calls);
            }
            if let Some(ref id) = m.tool_call_id {
                msg["tool_call_id"] = json!(id);
            }
            msg
        })
        .collect()
}

/// Parse a non-streaming `/chat/completions` response body.
fn parse_completion(body: &serde_json::Value) -> Result<ModelTurn, LlmError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| LlmError::Malformed("no choices in response".to_string()))?;
    let message = choice
        .get("message")
        .ok_or_else(|| LlmError::Malformed("choice missing message".to_string()))?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .unwrap_or("stop")
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|calls| parse_tool_calls(calls))
        .unwrap_or_default();

    Ok(ModelTurn { content, tool_calls, finish_reason })
}

fn parse_tool_calls(calls: &[serde_json::Value]) -> Vec<ToolCall> {
    calls
        .iter()
        .enumerate()
        .filter_map(|(i, tc)| {
            let id = tc.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            // arguments arrive as a JSON string on the wire; normalize to a value
            let arguments = func
                .get("arguments")
                .map(|v| {
                    if let Some(s) = v.as_str() {
                        serde_json::from_str(s).unwrap_or(json!({}))
                    } else {
                        v.clone()
                    }
                })
                .unwrap_or(json!({}));
            Some(ToolCall {
                id: if id.is_empty() { format!("call_{i}") } else { id },
                function: ToolCallFunction { name, arguments },
            })
        })
        .collect()
}
