//! Structured outputs exchanged between the agents and the orchestrator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single tool call record for the retrieval log.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RetrievalLogEntry {
    /// Name of the memory retriever tool called.
    pub tool: String,
    /// Parameters passed to the tool call.
    pub params: serde_json::Value,
    /// Brief summary of what the tool returned.
    pub result_summary: String,
}

/// Cumulative state passed to the retrieval agent on re-retrieval after an
/// execution failure, so it can avoid redundant queries.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RetrievalState {
    /// Current re-retrieval attempt number; 1 for the first re-retrieval.
    pub iteration: usize,
    /// All tool calls from prior retrieval turns.
    pub previous_queries: Vec<RetrievalLogEntry>,
    /// Why the execution agent's previous attempt failed.
    pub execution_failure_reason: String,
    /// Execution agent's best guess at what information is still needed.
    pub missing_information: String,
}

/// Structured output from the retrieval agent, consumed directly by the
/// execution agent to build enriched commands.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MemoryRetrievalOutput {
    /// Natural-language paragraph of all relevant facts retrieved from memory.
    pub context_summary: String,
    /// Single clear sentence describing the user's resolved intent.
    pub inferred_intent: String,
    /// Step-by-step reasoning trace for debugging and transparency.
    pub reasoning: String,
    /// Specific pieces of information not found in memory; empty when
    /// everything is resolved.
    #[serde(default)]
    pub unresolved: Vec<String>,
    /// Tool calls made this turn, used by future re-retrieval turns to
    /// avoid redundancy.
    #[serde(default)]
    pub retrieval_log: Vec<RetrievalLogEntry>,
}

impl MemoryRetrievalOutput {
    /// Best-effort fallback when the agent's final text did not parse: the
    /// raw text becomes the context.
    pub fn from_raw_text(raw: String) -> Self {
        Self {
            context_summary: raw,
            inferred_intent: String::new(),
            reasoning: String::new(),
            unresolved: vec![],
            retrieval_log: vec![],
        }
    }
}

/// Structured output from the execution agent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionLlmOutput {
    pub success: bool,
    pub result_summary: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub missing_information: Option<String>,
}

impl ExecutionLlmOutput {
    /// Wrap unstructured final text as a failed result so the orchestrator
    /// loop terminates predictably.
    pub fn failed_from_raw(raw: String) -> Self {
        Self {
            success: false,
            result_summary: raw,
            failure_reason: Some("execution agent returned unstructured output".to_string()),
            missing_information: None,
        }
    }
}
