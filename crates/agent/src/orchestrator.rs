//! Request-scoped orchestration: bounded retrieve→execute→re-retrieve loop.
//!
//! Retrieval context feeds execution; an execution failure feeds the next
//! retrieval as cumulative retrieval state. The loop never throws on a
//! failed execution — the last result is always returned to the caller.

use serde::Serialize;
use tracing::info;

use crate::execution::ExecutionAgent;
use crate::outputs::{ExecutionLlmOutput, RetrievalLogEntry, RetrievalState};
use crate::retrieval::RetrievalAgent;
use crate::AgentError;

/// Final outcome of one orchestrated request.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorOutcome {
    pub result: ExecutionLlmOutput,
    pub iterations_used: usize,
    /// True when the loop ran out of iterations without a success.
    pub exhausted: bool,
    /// Every retrieval tool call made across all passes.
    pub retrieval_log: Vec<RetrievalLogEntry>,
}

pub struct Orchestrator {
    retrieval: RetrievalAgent,
    execution: ExecutionAgent,
    max_iterations: usize,
}

impl Orchestrator {
    pub fn new(retrieval: RetrievalAgent, execution: ExecutionAgent, max_iterations: usize) -> Self {
        Self {
            retrieval,
            execution,
            max_iterations: max_iterations.max(1),
        }
    }

    /// With `max_iterations = k`: at most k execution passes and at most k
    /// retrieval passes (the initial one plus k−1 re-retrievals). The
    /// retrieval log grows monotonically across passes.
    pub async fn run(&self, user_request: &str) -> Result<OrchestratorOutcome, AgentError> {
        let mut all_prev_queries: Vec<RetrievalLogEntry> = Vec::new();

        let initial = self.retrieval.retrieve(user_request, None).await?;
        let mut context = initial.context_summary;
        all_prev_queries.extend(initial.retrieval_log);

        let mut last_result: Option<ExecutionLlmOutput> = None;
        for iteration in 1..=self.max_iterations {
            info!(iteration, "orchestrator execution pass");
            let result = self.execution.execute(user_request, &context).await?;

            if result.success {
                return Ok(OrchestratorOutcome {
                    result,
                    iterations_used: iteration,
                    exhausted: false,
                    retrieval_log: all_prev_queries,
                });
            }

            let failure_reason = result
                .failure_reason
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());
            let missing_information = result
                .missing_information
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());
            last_result = Some(result);

            // no point re-retrieving when no execution pass remains
            if iteration == self.max_iterations {
                break;
            }

            let state = RetrievalState {
                iteration,
                previous_queries: all_prev_queries.clone(),
                execution_failure_reason: failure_reason,
                missing_information,
            };
            let retrieval = self.retrieval.retrieve(user_request, Some(&state)).await?;
            context = retrieval.context_summary;
            all_prev_queries.extend(retrieval.retrieval_log);
        }

        let result = last_result.unwrap_or_else(|| ExecutionLlmOutput {
            success: false,
            result_summary: "no execution pass ran".to_string(),
            failure_reason: Some("orchestrator loop did not execute".to_string()),
            missing_information: None,
        });
        info!(iterations = self.max_iterations, "orchestrator exhausted iterations");
        Ok(OrchestratorOutcome {
            result,
            iterations_used: self.max_iterations,
            exhausted: true,
            retrieval_log: all_prev_queries,
        })
    }
}
