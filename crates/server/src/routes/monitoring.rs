//! Background-tracking control and introspection routes.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use valet_tracker::UiSnapshot;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/get-observations", get(get_observations))
        .route("/get-recent-state-changes", get(get_recent_state_changes))
        .route("/get-state-snapshots", get(get_state_snapshots))
        .route("/monitoring-overview", get(monitoring_overview))
        .route("/clear-observations", post(clear_observations))
        .route("/clear-state-changes", post(clear_state_changes))
        .route("/clear-state-snapshots", post(clear_state_snapshots))
        .route("/replay-snapshots", post(replay_snapshots))
}

#[derive(Debug, Deserialize)]
struct StartParams {
    #[serde(default = "default_poll_interval")]
    poll_interval: f64,
}

fn default_poll_interval() -> f64 {
    1.0
}

async fn start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StartParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if params.poll_interval <= 0.0 {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"message": "poll_interval must be greater than 0.0"})),
        ));
    }
    state.tracker.clone().start(params.poll_interval).await.map_err(|e| {
        error!(error = %e, "failed to start observation tracking");
        (
            StatusCode::CONFLICT,
            Json(json!({"message": format!("failed to start observation tracking: {e}")})),
        )
    })?;
    Ok(Json(json!({"message": "successfully started background observation tracking"})))
}

async fn stop(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.tracker.stop().await;
    Json(json!({"message": "successfully stopped background observation tracking"}))
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

fn validate_limit(limit: Option<usize>, max: usize) -> Result<Option<usize>, (StatusCode, Json<Value>)> {
    match limit {
        Some(limit) if limit == 0 || limit > max => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"message": format!("limit must be between 1 and {max}")})),
        )),
        other => Ok(other),
    }
}

async fn get_observations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = validate_limit(params.limit, 100)?;
    let observations = state.tracker.get_observations(limit, None).await;
    Ok(Json(json!({"observations": observations})))
}

async fn get_recent_state_changes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = validate_limit(params.limit, 10)?;
    let state_changes = state.tracker.get_state_changes(limit, None).await;
    Ok(Json(json!({"state_changes": state_changes})))
}

async fn get_state_snapshots(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = validate_limit(params.limit, 50)?;
    let snapshots = state.tracker.get_state_snapshots(limit).await;
    Ok(Json(json!({"snapshots": snapshots})))
}

async fn monitoring_overview(State(state): State<Arc<AppState>>) -> Json<Value> {
    let overview = state.tracker.monitoring_overview().await;
    Json(json!({"overview": overview}))
}

async fn clear_observations(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.tracker.clear_observations().await;
    Json(json!({"message": "successfully cleared observation history"}))
}

async fn clear_state_changes(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.tracker.clear_state_changes().await;
    Json(json!({"message": "successfully cleared recent UI state change history"}))
}

async fn clear_state_snapshots(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.tracker.clear_state_snapshots().await;
    Json(json!({"message": "successfully cleared state snapshot history"}))
}

#[derive(Debug, Deserialize)]
struct ReplayRequest {
    snapshots: Vec<UiSnapshot>,
}

async fn replay_snapshots(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReplayRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let count = request.snapshots.len();
    state.tracker.clone().replay(request.snapshots).await.map_err(|e| {
        error!(error = %e, "snapshot replay failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": format!("snapshot replay failed: {e}")})),
        )
    })?;
    Ok(Json(json!({"message": format!("replayed {count} snapshots")})))
}
