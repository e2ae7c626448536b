//! Structured-output calls.
//!
//! The model is asked for JSON conforming to a schema derived from the
//! response type. Failures are classified explicitly — transient transport
//! problems and schema mismatches retry with fixed backoff, everything else
//! fails fast — instead of using exceptions as control flow.

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use valet_config::LlmConfig;

use crate::{ChatMessage, ChatModel, CompletionOptions, LlmError, ModelTurn};

/// Terminal outcome of a structured call, after retries are spent.
#[derive(Debug, thiserror::Error)]
pub enum StructuredCallError {
    /// Retryable failures (transport, provider 5xx, schema mismatch) that
    /// still failed after the configured attempts.
    #[error("structured call failed after {attempts} attempts: {reason}")]
    Exhausted { attempts: usize, reason: String },
    /// Failures that retrying cannot fix (bad request, missing key).
    #[error("structured call failed: {0}")]
    Fatal(String),
}

/// Parse failure detail for a single attempt.
#[derive(Debug, thiserror::Error)]
#[error("response did not match schema: {0}")]
pub struct StructuredParseError(pub String);

/// Shared handle over a chat transport plus the retry policy. Cloneable and
/// safe for concurrent cooperative use; one instance is shared process-wide.
#[derive(Clone)]
pub struct LlmClient {
    model: Arc<dyn ChatModel>,
    retry_attempts: usize,
    retry_backoff: Duration,
}

/// Per-attempt classification, retried or surfaced by the caller loop.
enum AttemptError {
    Retryable(String),
    Fatal(String),
}

impl LlmClient {
    pub fn new(model: Arc<dyn ChatModel>, config: &LlmConfig) -> Self {
        Self {
            model,
            retry_attempts: config.retry_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Issue a system+user prompt and parse the reply into `T`, retrying
    /// schema mismatches and transient provider errors.
    pub async fn generate_structured<T>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<T, StructuredCallError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|e| StructuredCallError::Fatal(e.to_string()))?;
        let options = CompletionOptions {
            tools: None,
            response_schema: Some(schema),
        };
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];

        let mut last_reason = String::new();
        for attempt in 1..=self.retry_attempts {
            match self.model.complete(&messages, &options).await {
                Ok(turn) => match parse_structured_text::<T>(&turn.content) {
                    Ok(parsed) => return Ok(parsed),
                    Err(e) => {
                        warn!(attempt, error = %e, "structured output failed validation");
                        last_reason = e.to_string();
                    }
                },
                Err(e) => match classify(e) {
                    AttemptError::Retryable(reason) => {
                        warn!(attempt, %reason, "structured call transient failure");
                        last_reason = reason;
                    }
                    AttemptError::Fatal(reason) => {
                        return Err(StructuredCallError::Fatal(reason));
                    }
                },
            }
            if attempt < self.retry_attempts {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        Err(StructuredCallError::Exhausted {
            attempts: self.retry_attempts,
            reason: last_reason,
        })
    }

    /// One completion with bounded transient retry, used by the tool loop.
    pub(crate) async fn complete_with_retry(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ModelTurn, LlmError> {
        let mut last = None;
        for attempt in 1..=self.retry_attempts {
            match self.model.complete(messages, options).await {
                Ok(turn) => return Ok(turn),
                Err(e) => {
                    let retryable = matches!(
                        &e,
                        LlmError::Transport(_) | LlmError::Provider { status: 500..=599, .. }
                    );
                    if !retryable {
                        return Err(e);
                    }
                    debug!(attempt, error = %e, "completion transient failure");
                    last = Some(e);
                    if attempt < self.retry_attempts {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }
        Err(last.unwrap_or_else(|| LlmError::Transport("retry loop ran zero attempts".into())))
    }
}

fn classify(error: LlmError) -> AttemptError {
    match error {
        LlmError::Transport(reason) => AttemptError::Retryable(reason),
        LlmError::Provider { status, body } if (500..=599).contains(&status) => {
            AttemptError::Retryable(format!("provider {status}: {body}"))
        }
        LlmError::Provider { status, body } => {
            AttemptError::Fatal(format!("provider {status}: {body}"))
        }
        LlmError::Malformed(reason) => AttemptError::Retryable(reason),
    }
}

/// Strip markdown code fences (```json … ``` or ``` … ```) from model output.
pub fn strip_markdown_fences(text: &str) -> &str {
    let stripped = text.trim();
    let Some(rest) = stripped.strip_prefix("```") else {
        return stripped;
    };
    // drop the fence line itself ("```json" or bare "```")
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return stripped,
    };
    let body = body.trim_end();
    body.strip_suffix("```").map(str::trim_end).unwrap_or(body).trim()
}

/// Strip fences and parse the text as `T`.
pub fn parse_structured_text<T: DeserializeOwned>(text: &str) -> Result<T, StructuredParseError> {
    let cleaned = strip_markdown_fences(text);
    if cleaned.is_empty() {
        return Err(StructuredParseError("empty response".to_string()));
    }
    serde_json::from_str(cleaned).map_err(|e| StructuredParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{ToolCall, ToolCallFunction};

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Probe {
        answer: String,
        confident: bool,
    }

    struct ScriptedModel {
        turns: std::sync::Mutex<Vec<Result<ModelTurn, LlmError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(turns: Vec<Result<ModelTurn, LlmError>>) -> Self {
            Self { turns: std::sync::Mutex::new(turns), calls: AtomicUsize::new(0) }
        }
        fn text(content: &str) -> Result<ModelTurn, LlmError> {
            Ok(ModelTurn { content: content.to_string(), tool_calls: vec![], finish_reason: "stop".into() })
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<ModelTurn, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Err(LlmError::Transport("script exhausted".into()));
            }
            turns.remove(0)
        }
    }

    fn client(model: ScriptedModel) -> LlmClient {
        let mut config = valet_config::LlmConfig::default();
        config.retry_backoff_ms = 0;
        LlmClient::new(Arc::new(model), &config)
    }

    #[test]
    fn strip_fences_json_block() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_markdown_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn strip_fences_bare_block() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_markdown_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn strip_fences_passthrough_plain_text() {
        assert_eq!(strip_markdown_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn parse_structured_text_rejects_garbage() {
        assert!(parse_structured_text::<Probe>("not json at all").is_err());
        assert!(parse_structured_text::<Probe>("").is_err());
    }

    #[tokio::test]
    async fn generate_structured_parses_first_try() {
        let model = ScriptedModel::new(vec![ScriptedModel::text(
            "{\"answer\": \"yes\", \"confident\": true}",
        )]);
        let out: Probe = client(model).generate_structured("sys", "user").await.unwrap();
        assert_eq!(out, Probe { answer: "yes".into(), confident: true });
    }

    #[tokio::test]
    async fn generate_structured_retries_schema_mismatch() {
        let model = ScriptedModel::new(vec![
            ScriptedModel::text("this is not json"),
            ScriptedModel::text("```json\n{\"answer\": \"ok\", \"confident\": false}\n```"),
        ]);
        let out: Probe = client(model).generate_structured("sys", "user").await.unwrap();
        assert_eq!(out.answer, "ok");
    }

    #[tokio::test]
    async fn generate_structured_exhausts_after_bounded_attempts() {
        let model = ScriptedModel::new(vec![
            ScriptedModel::text("junk"),
            ScriptedModel::text("more junk"),
            ScriptedModel::text("{\"answer\": \"too late\", \"confident\": true}"),
        ]);
        let err = client(model)
            .generate_structured::<Probe>("sys", "user")
            .await
            .unwrap_err();
        match err {
            StructuredCallError::Exhausted { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generate_structured_fatal_on_client_error() {
        let model = ScriptedModel::new(vec![Err(LlmError::Provider {
            status: 401,
            body: "bad key".into(),
        })]);
        let err = client(model)
            .generate_structured::<Probe>("sys", "user")
            .await
            .unwrap_err();
        assert!(matches!(err, StructuredCallError::Fatal(_)));
    }

    #[tokio::test]
    async fn complete_with_retry_recovers_from_transport_blip() {
        let model = ScriptedModel::new(vec![
            Err(LlmError::Transport("connection reset".into())),
            ScriptedModel::text("recovered"),
        ]);
        let llm = client(model);
        let turn = llm
            .complete_with_retry(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(turn.content, "recovered");
    }

    #[tokio::test]
    async fn complete_with_retry_does_not_retry_4xx() {
        let model = ScriptedModel::new(vec![
            Err(LlmError::Provider { status: 400, body: "bad request".into() }),
            ScriptedModel::text("should never be reached"),
        ]);
        let llm = client(model);
        let err = llm
            .complete_with_retry(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Provider { status: 400, .. }));
    }

    #[test]
    fn tool_call_struct_survives_serde() {
        let call = ToolCall {
            id: "call_0".into(),
            function: ToolCallFunction {
                name: "f".into(),
                arguments: serde_json::json!({"x": 1}),
            },
        };
        let round: ToolCall =
            serde_json::from_str(&serde_json::to_string(&call).unwrap()).unwrap();
        assert_eq!(round.function.name, "f");
    }
}
