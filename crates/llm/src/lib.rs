use serde::{Deserialize, Serialize};
use serde_json::json;

mod client;
mod embedding;
mod structured;
mod toolcall;

pub use client::HttpChatModel;
pub use embedding::{EmbeddingTask, HttpTextEmbedder, TextEmbedder};
pub use structured::{
    parse_structured_text, strip_markdown_fences, LlmClient, StructuredCallError,
    StructuredParseError,
};
pub use toolcall::{ToolDeclaration, ToolExecutor, ToolLoopError, ToolSet, ValidatedReply};

// ── Chat message types ───────────────────────────────────────────────────────

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a chat conversation.
///
/// Matches the OpenAI-compatible `/chat/completions` message shape that the
/// provider endpoints accept for native tool calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    /// Tool calls requested by the assistant (only present on assistant messages).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// When role == Tool, identifies which tool call this result is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { role: ChatRole::Assistant, content: None, tool_calls, tool_call_id: None }
    }
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: ChatRole::Tool, content: Some(content.into()), tool_calls: vec![], tool_call_id: Some(tool_call_id.into()) }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call (used to correlate tool results). Providers
    /// may omit one, in which case the transport generates one.
    #[serde(default)]
    pub id: String,
    pub function: ToolCallFunction,
}

/// The function name and arguments within a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Arguments normalized to a parsed JSON object for downstream consumers.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// One model response: either final text, or a batch of requested tool calls.
#[derive(Debug, Clone)]
pub struct ModelTurn {
    /// Text content of the assistant's response (may be empty when tool
    /// calls are present).
    pub content: String,
    /// Tool calls the assistant wants to make (empty for a text response).
    pub tool_calls: Vec<ToolCall>,
    /// Finish reason: "stop", "tool_calls", "length", etc.
    pub finish_reason: String,
}

impl ModelTurn {
    pub fn is_text(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// Transport-level failures from the chat or embedding providers.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("provider response missing expected fields: {0}")]
    Malformed(String),
}

/// What a single model call asks for, beyond the conversation itself.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// OpenAI-compatible `tools` array, when the call allows tool use.
    pub tools: Option<serde_json::Value>,
    /// JSON schema the final text must conform to, when the call wants a
    /// structured response.
    pub response_schema: Option<serde_json::Value>,
}

/// The chat-model seam. The HTTP transport implements this for production;
/// tests substitute scripted fakes.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ModelTurn, LlmError>;
}

/// Build the OpenAI-compatible `tools` array from declarations.
pub fn declarations_to_tools(declarations: &[ToolDeclaration]) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = declarations
        .iter()
        .map(|d| {
            json!({
                "type": "function",
                "function": {
                    "name": d.name,
                    "description": d.description,
                    "parameters": d.parameters,
                }
            })
        })
        .collect();
    json!(entries)
}
