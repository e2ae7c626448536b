mod execution;
mod orchestrator;
mod outputs;
mod prompts;
mod retrieval;
#[cfg(test)]
mod testutil;
mod tools;

pub use execution::ExecutionAgent;
pub use orchestrator::{Orchestrator, OrchestratorOutcome};
pub use outputs::{
    ExecutionLlmOutput, MemoryRetrievalOutput, RetrievalLogEntry, RetrievalState,
};
pub use retrieval::RetrievalAgent;
pub use tools::{device_tool_set, retriever_tool_set};

/// Agent infrastructure failures — the tool loop blew its turn budget, the
/// model named an undeclared tool, or the provider was unreachable.
/// Semantic failures (device refusal, missing information) are not errors;
/// they travel inside [`ExecutionLlmOutput`].
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    ToolLoop(#[from] valet_llm::ToolLoopError),
}
