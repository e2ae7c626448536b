//! Execution agent: turns the request plus retrieved context into enriched
//! device commands through the `execute_command` tool.

use std::sync::Arc;

use tracing::{info, warn};

use valet_device::DeviceDriver;
use valet_llm::{LlmClient, ToolSet};

use crate::outputs::ExecutionLlmOutput;
use crate::prompts::EXECUTION_SYSTEM_PROMPT;
use crate::tools::device_tool_set;
use crate::AgentError;

pub struct ExecutionAgent {
    llm: LlmClient,
    tools: ToolSet,
    max_turns: usize,
}

impl ExecutionAgent {
    pub fn new(llm: LlmClient, device: Arc<dyn DeviceDriver>, max_turns: usize) -> Self {
        Self {
            llm,
            tools: device_tool_set(device),
            max_turns,
        }
    }

    /// One execution pass. `context` is the retrieval agent's summary;
    /// empty when running context-free.
    pub async fn execute(
        &self,
        user_request: &str,
        context: &str,
    ) -> Result<ExecutionLlmOutput, AgentError> {
        let prompt = if context.trim().is_empty() {
            format!("User request: {user_request}\n\nNo retrieved context is available.")
        } else {
            format!("User request: {user_request}\n\nRetrieved context:\n{context}")
        };

        let reply = self
            .llm
            .tool_call_validated::<ExecutionLlmOutput>(
                EXECUTION_SYSTEM_PROMPT,
                &prompt,
                &self.tools,
                self.max_turns,
            )
            .await?;

        match reply.parsed {
            Some(output) => {
                info!(success = output.success, "execution pass complete");
                Ok(output)
            }
            None => {
                warn!("execution agent output did not parse, wrapping as failed result");
                Ok(ExecutionLlmOutput::failed_from_raw(reply.raw))
            }
        }
    }
}
