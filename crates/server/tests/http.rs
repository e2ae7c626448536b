//! Integration tests for the HTTP surface.
//!
//! Uses `axum_test::TestServer` over scripted fakes — no real providers or
//! device needed.

use std::sync::{Arc, Mutex};

use axum_test::TestServer;
use chrono::Utc;
use serde_json::json;

use valet_config::AppConfig;
use valet_device::{
    CommandRequest, DeviceDriver, DeviceError, PortalInfo, RawExecutionResult, UiState,
};
use valet_llm::{
    ChatMessage, ChatModel, CompletionOptions, EmbeddingTask, LlmError, ModelTurn, TextEmbedder,
    ToolCall, ToolCallFunction,
};
use valet_memory::{EmbeddingRecord, PersonRecord, VectorStore};
use valet_server::{build_router, AppState};

// ── Fakes ────────────────────────────────────────────────────────────────

struct ScriptedModel {
    replies: Mutex<Vec<ModelTurn>>,
}

impl ScriptedModel {
    fn new(replies: Vec<ModelTurn>) -> Self {
        Self { replies: Mutex::new(replies) }
    }
    fn empty() -> Self {
        Self::new(vec![])
    }
}

#[async_trait::async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<ModelTurn, LlmError> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(LlmError::Transport("script exhausted".into()));
        }
        Ok(replies.remove(0))
    }
}

fn text(content: &str) -> ModelTurn {
    ModelTurn { content: content.into(), tool_calls: vec![], finish_reason: "stop".into() }
}

fn command_call(command: &str) -> ModelTurn {
    ModelTurn {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: "call_0".into(),
            function: ToolCallFunction {
                name: "execute_command".into(),
                arguments: json!({"enriched_command": command}),
            },
        }],
        finish_reason: "tool_calls".into(),
    }
}

struct UnitEmbedder;

#[async_trait::async_trait]
impl TextEmbedder for UnitEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        _task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

struct FakeDevice;

#[async_trait::async_trait]
impl DeviceDriver for FakeDevice {
    async fn get_state(&self) -> Result<UiState, DeviceError> {
        Ok(UiState::new("com.android.launcher", "Home", None, vec![], "home screen", json!(null)))
    }
    async fn execute_command(
        &self,
        request: CommandRequest,
    ) -> Result<RawExecutionResult, DeviceError> {
        Ok(RawExecutionResult {
            timestamp: Utc::now(),
            command: request.command,
            success: true,
            reason: None,
            steps: 1,
        })
    }
    async fn ping(&self) -> Result<PortalInfo, DeviceError> {
        Ok(PortalInfo { version: "1.0-test".into(), device_serial: Some("emu-5554".into()) })
    }
}

fn test_state(model: ScriptedModel) -> Arc<AppState> {
    AppState::assemble(
        AppConfig::default(),
        Arc::new(model),
        Arc::new(UnitEmbedder),
        Arc::new(FakeDevice),
    )
}

fn test_server(state: Arc<AppState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to build test server")
}

fn snapshot(n: usize) -> serde_json::Value {
    json!({
        "text": format!("DM thread with sarah_smith, message {n}"),
        "activity": "DirectThreadActivity",
        "package": "com.instagram.android",
        "timestamp": Utc::now(),
        "is_app_switch": false,
    })
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn root_returns_hello() {
    let server = test_server(test_state(ScriptedModel::empty()));
    let resp = server.get("/").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert!(body["message"].as_str().unwrap().contains("valet"));
}

#[tokio::test]
async fn health_reports_per_service_blocks() {
    let server = test_server(test_state(ScriptedModel::empty()));
    let resp = server.get("/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["store"]["status"], "healthy");
    assert_eq!(body["services"]["embedding"]["status"], "healthy");
    assert_eq!(body["services"]["device"]["status"], "healthy");
    assert_eq!(body["services"]["device"]["portal_version"], "1.0-test");
    // LLM probe disabled by default
    assert_eq!(body["services"]["llm"]["status"], "skipped");
}

#[tokio::test]
async fn start_rejects_non_positive_poll_interval() {
    let server = test_server(test_state(ScriptedModel::empty()));
    let resp = server
        .post("/monitoring/background-tasks/start")
        .add_query_param("poll_interval", "0.0")
        .await;
    resp.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn replay_then_read_observations_and_overview() {
    // one create-inference reply for the 10-snapshot window
    let state = test_state(ScriptedModel::new(vec![text(
        "{\"observation_node\": \"User DMs sarah_smith on Instagram\", \"reasoning\": \"recurring\"}",
    )]));
    let server = test_server(state);

    let snapshots: Vec<serde_json::Value> = (0..10).map(snapshot).collect();
    let resp = server
        .post("/monitoring/background-tasks/replay-snapshots")
        .json(&json!({"snapshots": snapshots}))
        .await;
    resp.assert_status_ok();

    let resp = server
        .get("/monitoring/background-tasks/get-observations")
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    let observations = body["observations"].as_array().unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0]["node"], "User DMs sarah_smith on Instagram");
    assert_eq!(observations[0]["memory_type"], "short_term_preferences");

    let resp = server
        .get("/monitoring/background-tasks/monitoring-overview")
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["overview"]["observations"], 1);
    assert_eq!(body["overview"]["state_snapshots"], 10);

    // clear and confirm empty
    server
        .post("/monitoring/background-tasks/clear-observations")
        .await
        .assert_status_ok();
    let resp = server
        .get("/monitoring/background-tasks/get-observations")
        .await;
    let body: serde_json::Value = resp.json();
    assert!(body["observations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn get_observations_rejects_out_of_range_limit() {
    let server = test_server(test_state(ScriptedModel::empty()));
    let resp = server
        .get("/monitoring/background-tasks/get-observations")
        .add_query_param("limit", "0")
        .await;
    resp.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);

    let resp = server
        .get("/monitoring/background-tasks/get-recent-state-changes")
        .add_query_param("limit", "99")
        .await;
    resp.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn semantic_search_returns_results_with_elapsed() {
    let state = test_state(ScriptedModel::empty());
    state
        .store
        .vector()
        .insert_embedding(EmbeddingRecord::new(
            uuid::Uuid::new_v4(),
            "User watches fitness content nightly",
            vec![1.0, 0.0],
        ))
        .await
        .unwrap();
    let server = test_server(state);

    let resp = server
        .post("/retrieval-test/semantic-search")
        .json(&json!({"query": "fitness content"}))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(
        body["results"][0],
        "User watches fitness content nightly"
    );
    assert!(body["elapsed_ms"].as_f64().is_some());
}

#[tokio::test]
async fn semantic_search_rejects_unknown_metric() {
    let server = test_server(test_state(ScriptedModel::empty()));
    let resp = server
        .post("/retrieval-test/semantic-search")
        .json(&json!({"query": "x", "distance_metric": "manhattan"}))
        .await;
    resp.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn find_person_by_name_matches_with_typo() {
    let state = test_state(ScriptedModel::empty());
    state
        .store
        .vector()
        .insert_person(PersonRecord {
            id: "person_sarah".into(),
            first_name: "Sarah".into(),
            last_name: Some("Smith".into()),
            full_name: "Sarah Smith".into(),
            platform: Some("instagram".into()),
            platform_handle: Some("@sarah_smith".into()),
            relationship_description: "Close friend from work".into(),
            relationship_vector: vec![1.0, 0.0],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_interacted_at: None,
            interaction_count: 3,
        })
        .await
        .unwrap();
    let server = test_server(state);

    let resp = server
        .post("/retrieval-test/find-person-by-name")
        .json(&json!({"name": "Sara Smith"}))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["matches"][0]["full_name"], "Sarah Smith");
}

#[tokio::test]
async fn orchestrated_execution_runs_full_loop() {
    let state = test_state(ScriptedModel::new(vec![
        text("{\"context_summary\": \"no relevant memory\", \"inferred_intent\": \"check battery\", \"reasoning\": \"r\", \"unresolved\": [], \"retrieval_log\": []}"),
        command_call("Open Settings > Battery and read the battery level"),
        text("{\"success\": true, \"result_summary\": \"battery is at 80%\", \"failure_reason\": null, \"missing_information\": null}"),
    ]));
    let server = test_server(state);

    let resp = server
        .post("/execution-test/orchestrated-execution-test")
        .json(&json!({"user_request": "Check my battery level"}))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["outcome"]["result"]["success"], true);
    assert_eq!(body["outcome"]["exhausted"], false);
    assert_eq!(body["outcome"]["iterations_used"], 1);
}

#[tokio::test]
async fn direct_device_execution_hits_driver() {
    let server = test_server(test_state(ScriptedModel::empty()));
    let resp = server
        .post("/execution-test/direct-device-execution-test")
        .json(&json!({"command": "open settings"}))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["result"]["success"], true);
    assert_eq!(body["result"]["command"], "open settings");
}
