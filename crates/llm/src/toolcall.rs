//! Tool-call loop.
//!
//! Sends the conversation with tool declarations, executes any requested
//! calls through a registry of typed executors, feeds results back as
//! tool-role messages, and repeats until the model produces final text or
//! the turn budget runs out. Executor failures are returned to the model as
//! `{"error": …}` payloads so it can recover or explain; a request for an
//! undeclared tool is a build-time mismatch and fails fast.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, warn};

use crate::structured::parse_structured_text;
use crate::{declarations_to_tools, ChatMessage, CompletionOptions, LlmClient, LlmError};

/// Describes one callable tool to the model: name, description, and a JSON
/// schema for its parameters.
#[derive(Debug, Clone)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One executable tool binding. Implementations wrap a retriever method or
/// the device command entry point.
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn invoke(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// Declarations plus their executors, keyed by declaration name.
#[derive(Default)]
pub struct ToolSet {
    declarations: Vec<ToolDeclaration>,
    executors: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolSet {
    pub fn register(&mut self, declaration: ToolDeclaration, executor: Arc<dyn ToolExecutor>) {
        self.executors.insert(declaration.name.clone(), executor);
        self.declarations.push(declaration);
    }

    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    pub fn executor(&self, name: &str) -> Option<&Arc<dyn ToolExecutor>> {
        self.executors.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.declarations.iter().map(|d| d.name.clone()).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolLoopError {
    /// The model asked for a tool that has no executor — a declaration/
    /// executor mismatch, not something the loop can recover from.
    #[error("model requested unknown tool '{name}' (available: {available:?})")]
    UnknownTool { name: String, available: Vec<String> },
    #[error("tool loop exhausted {0} turns without a final text response")]
    MaxTurns(usize),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Final text plus the optional parse of it, when the caller supplied a
/// response type. `parsed` is `None` when the text did not match — callers
/// fall back to the raw text.
#[derive(Debug)]
pub struct ValidatedReply<T> {
    pub parsed: Option<T>,
    pub raw: String,
}

impl LlmClient {
    /// Run the tool loop to completion and return the model's final text.
    pub async fn tool_call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tools: &ToolSet,
        max_turns: usize,
    ) -> Result<String, ToolLoopError> {
        let options = CompletionOptions {
            tools: Some(declarations_to_tools(tools.declarations())),
            response_schema: None,
        };
        let mut messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];

        for turn in 1..=max_turns {
            let reply = self.complete_with_retry(&messages, &options).await?;

            if reply.is_text() {
                return Ok(reply.content);
            }

            info!(turn, count = reply.tool_calls.len(), "model requested tool calls");
            messages.push(ChatMessage::assistant_tool_calls(reply.tool_calls.clone()));

            for call in &reply.tool_calls {
                let name = &call.function.name;
                let Some(executor) = tools.executor(name) else {
                    return Err(ToolLoopError::UnknownTool {
                        name: name.clone(),
                        available: tools.names(),
                    });
                };

                info!(turn, tool = %name, args = %call.function.arguments, "executing tool call");
                let payload = match executor.invoke(call.function.arguments.clone()).await {
                    Ok(result) => json!({"result": result}),
                    Err(e) => {
                        // hand the failure back so the model can adjust
                        warn!(tool = %name, error = %e, "tool execution failed");
                        json!({"error": e.to_string()})
                    }
                };
                messages.push(ChatMessage::tool_result(&call.id, payload.to_string()));
            }
        }

        Err(ToolLoopError::MaxTurns(max_turns))
    }

    /// Same loop, but attempt to parse the final text as `T`. A mismatch is
    /// not an error: the raw text is preserved and a warning logged.
    pub async fn tool_call_validated<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tools: &ToolSet,
        max_turns: usize,
    ) -> Result<ValidatedReply<T>, ToolLoopError> {
        let raw = self.tool_call(system_prompt, user_prompt, tools, max_turns).await?;
        match parse_structured_text::<T>(&raw) {
            Ok(parsed) => Ok(ValidatedReply { parsed: Some(parsed), raw }),
            Err(e) => {
                warn!(error = %e, raw = %truncate(&raw, 500), "final text failed schema validation");
                Ok(ValidatedReply { parsed: None, raw })
            }
        }
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    if limit >= text.len() {
        return text;
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde::Deserialize;

    use crate::{ChatModel, ModelTurn, ToolCall, ToolCallFunction};

    struct ScriptedModel {
        turns: Mutex<Vec<ModelTurn>>,
    }

    impl ScriptedModel {
        fn new(turns: Vec<ModelTurn>) -> Self {
            Self { turns: Mutex::new(turns) }
        }
        fn text(content: &str) -> ModelTurn {
            ModelTurn { content: content.into(), tool_calls: vec![], finish_reason: "stop".into() }
        }
        fn call(name: &str, args: serde_json::Value) -> ModelTurn {
            ModelTurn {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: "call_0".into(),
                    function: ToolCallFunction { name: name.into(), arguments: args },
                }],
                finish_reason: "tool_calls".into(),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<ModelTurn, LlmError> {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Err(LlmError::Transport("script exhausted".into()));
            }
            Ok(turns.remove(0))
        }
    }

    struct CountingEcho {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ToolExecutor for CountingEcho {
        async fn invoke(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"echo": args}))
        }
    }

    struct FailingTool;

    #[async_trait::async_trait]
    impl ToolExecutor for FailingTool {
        async fn invoke(&self, _args: serde_json::Value) -> anyhow::Result<serde_json::Value> {
            anyhow::bail!("device unreachable")
        }
    }

    fn echo_tools(executor: Arc<dyn ToolExecutor>) -> ToolSet {
        let mut tools = ToolSet::default();
        tools.register(
            ToolDeclaration {
                name: "echo".into(),
                description: "Echo the arguments".into(),
                parameters: json!({"type": "object", "properties": {}}),
            },
            executor,
        );
        tools
    }

    fn client(model: ScriptedModel) -> LlmClient {
        let mut config = valet_config::LlmConfig::default();
        config.retry_backoff_ms = 0;
        LlmClient::new(Arc::new(model), &config)
    }

    #[tokio::test]
    async fn loop_returns_text_without_tools() {
        let llm = client(ScriptedModel::new(vec![ScriptedModel::text("done")]));
        let tools = echo_tools(Arc::new(CountingEcho { calls: AtomicUsize::new(0) }));
        let out = llm.tool_call("sys", "user", &tools, 5).await.unwrap();
        assert_eq!(out, "done");
    }

    #[tokio::test]
    async fn loop_executes_tool_then_returns_text() {
        let llm = client(ScriptedModel::new(vec![
            ScriptedModel::call("echo", json!({"q": "battery"})),
            ScriptedModel::text("battery is 80%"),
        ]));
        let executor = Arc::new(CountingEcho { calls: AtomicUsize::new(0) });
        let tools = echo_tools(executor.clone());
        let out = llm.tool_call("sys", "user", &tools, 5).await.unwrap();
        assert_eq!(out, "battery is 80%");
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loop_fails_fast_on_unknown_tool() {
        let llm = client(ScriptedModel::new(vec![ScriptedModel::call(
            "not_registered",
            json!({}),
        )]));
        let tools = echo_tools(Arc::new(CountingEcho { calls: AtomicUsize::new(0) }));
        let err = llm.tool_call("sys", "user", &tools, 5).await.unwrap_err();
        match err {
            ToolLoopError::UnknownTool { name, available } => {
                assert_eq!(name, "not_registered");
                assert_eq!(available, vec!["echo".to_string()]);
            }
            other => panic!("expected UnknownTool, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn loop_surfaces_tool_error_to_model_and_continues() {
        let llm = client(ScriptedModel::new(vec![
            ScriptedModel::call("echo", json!({})),
            ScriptedModel::text("could not reach the device"),
        ]));
        let tools = echo_tools(Arc::new(FailingTool));
        // The failing tool does not abort the loop — the error payload goes
        // back to the model, which then answers in text.
        let out = llm.tool_call("sys", "user", &tools, 5).await.unwrap();
        assert_eq!(out, "could not reach the device");
    }

    #[tokio::test]
    async fn loop_errors_after_max_turns() {
        let calls: Vec<ModelTurn> = (0..4)
            .map(|_| ScriptedModel::call("echo", json!({})))
            .collect();
        let llm = client(ScriptedModel::new(calls));
        let tools = echo_tools(Arc::new(CountingEcho { calls: AtomicUsize::new(0) }));
        let err = llm.tool_call("sys", "user", &tools, 3).await.unwrap_err();
        assert!(matches!(err, ToolLoopError::MaxTurns(3)));
    }

    #[derive(Debug, Deserialize)]
    struct Summary {
        verdict: String,
    }

    #[tokio::test]
    async fn validated_reply_parses_final_text() {
        let llm = client(ScriptedModel::new(vec![ScriptedModel::text(
            "{\"verdict\": \"ok\"}",
        )]));
        let tools = ToolSet::default();
        let reply: ValidatedReply<Summary> =
            llm.tool_call_validated("sys", "user", &tools, 5).await.unwrap();
        assert_eq!(reply.parsed.unwrap().verdict, "ok");
    }

    #[tokio::test]
    async fn validated_reply_falls_back_to_raw_text() {
        let llm = client(ScriptedModel::new(vec![ScriptedModel::text(
            "Sarah uses Instagram for messaging.",
        )]));
        let tools = ToolSet::default();
        let reply: ValidatedReply<Summary> =
            llm.tool_call_validated("sys", "user", &tools, 5).await.unwrap();
        assert!(reply.parsed.is_none());
        assert_eq!(reply.raw, "Sarah uses Instagram for messaging.");
    }
}
