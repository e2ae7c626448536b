pub mod execution_test;
pub mod health;
pub mod monitoring;

use axum::Json;
use serde_json::{json, Value};

/// `GET /`
pub async fn root() -> Json<Value> {
    Json(json!({"message": "valet assistant service"}))
}
