//! Retrieval agent: resolves an ambiguous request against memory through a
//! tool-call loop over the retriever.

use std::sync::Arc;

use tracing::{info, warn};

use valet_llm::{LlmClient, ToolSet};
use valet_memory::MemoryRetriever;

use crate::outputs::{MemoryRetrievalOutput, RetrievalState};
use crate::prompts::RETRIEVAL_SYSTEM_PROMPT;
use crate::tools::retriever_tool_set;
use crate::AgentError;

pub struct RetrievalAgent {
    llm: LlmClient,
    tools: ToolSet,
    max_turns: usize,
}

impl RetrievalAgent {
    pub fn new(llm: LlmClient, retriever: Arc<MemoryRetriever>, max_turns: usize) -> Self {
        Self {
            llm,
            tools: retriever_tool_set(retriever),
            max_turns,
        }
    }

    /// One retrieval pass. On re-entry the orchestrator supplies the
    /// cumulative retrieval state, which is appended to the request as JSON
    /// text for the model to consume.
    pub async fn retrieve(
        &self,
        user_request: &str,
        retrieval_state: Option<&RetrievalState>,
    ) -> Result<MemoryRetrievalOutput, AgentError> {
        let prompt = match retrieval_state {
            Some(state) => {
                let rendered = serde_json::to_string_pretty(state)
                    .unwrap_or_else(|_| "{}".to_string());
                format!("{user_request}\n\nretrieval_state:\n{rendered}")
            }
            None => user_request.to_string(),
        };

        let reply = self
            .llm
            .tool_call_validated::<MemoryRetrievalOutput>(
                RETRIEVAL_SYSTEM_PROMPT,
                &prompt,
                &self.tools,
                self.max_turns,
            )
            .await?;

        match reply.parsed {
            Some(output) => {
                info!(
                    intent = %output.inferred_intent,
                    unresolved = output.unresolved.len(),
                    tool_calls = output.retrieval_log.len(),
                    "retrieval pass complete"
                );
                Ok(output)
            }
            None => {
                warn!("retrieval agent output did not parse, using raw text as context");
                Ok(MemoryRetrievalOutput::from_raw_text(reply.raw))
            }
        }
    }
}
