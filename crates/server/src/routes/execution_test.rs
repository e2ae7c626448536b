//! Execution-path test routes: the full orchestrated loop, the execution
//! agent alone, and a direct device call.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use valet_agent::{ExecutionAgent, Orchestrator, RetrievalAgent};
use valet_device::{CommandRequest, ExecutionReport};

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orchestrated-execution-test", post(orchestrated))
        .route("/no-context-execution-test", post(no_context))
        .route("/direct-device-execution-test", post(direct_device))
}

#[derive(Debug, Deserialize)]
struct ExecutionTestRequest {
    user_request: String,
}

fn agent_error(e: valet_agent::AgentError) -> (StatusCode, Json<Value>) {
    error!(error = %e, "agent infrastructure failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"message": format!("agent infrastructure failure: {e}")})),
    )
}

async fn orchestrated(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecutionTestRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // request-scoped orchestrator over the shared clients
    let orchestrator = Orchestrator::new(
        RetrievalAgent::new(
            state.llm.clone(),
            state.retriever.clone(),
            state.config.agent.max_turns,
        ),
        ExecutionAgent::new(
            state.llm.clone(),
            state.device.clone(),
            state.config.agent.max_turns,
        ),
        state.config.agent.max_iterations,
    );

    let outcome = orchestrator
        .run(&request.user_request)
        .await
        .map_err(agent_error)?;
    Ok(Json(json!({"outcome": outcome})))
}

async fn no_context(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecutionTestRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let agent = ExecutionAgent::new(
        state.llm.clone(),
        state.device.clone(),
        state.config.agent.max_turns,
    );
    let result = agent
        .execute(&request.user_request, "")
        .await
        .map_err(agent_error)?;
    Ok(Json(json!({"result": result})))
}

#[derive(Debug, Deserialize)]
struct DirectCommandRequest {
    command: String,
    #[serde(default)]
    reasoning: Option<bool>,
    #[serde(default)]
    timeout: Option<u64>,
}

async fn direct_device(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DirectCommandRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let device_error = |e: valet_device::DeviceError| {
        error!(error = %e, "direct device command failed");
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({"message": format!("device call failed: {e}")})),
        )
    };

    // enrich the bare result with the UI transition the command caused
    let state_before = state.device.get_state().await.map_err(device_error)?;
    let result = state
        .device
        .execute_command(CommandRequest {
            command: request.command,
            reasoning: request.reasoning,
            timeout_secs: request.timeout,
        })
        .await
        .map_err(device_error)?;
    let state_after = state.device.get_state().await.map_err(device_error)?;

    let report = ExecutionReport::new(result, state_before, state_after);
    Ok(Json(json!({"result": report})))
}
