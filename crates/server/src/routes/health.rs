//! Composite health check: every service is probed independently and
//! reported in its own block. The LLM probe is config-gated to avoid
//! spending provider quota on routine checks.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use valet_llm::EmbeddingTask;

use crate::AppState;

#[derive(Debug, Deserialize, JsonSchema)]
struct ConnectivityProbe {
    connected: bool,
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut services = serde_json::Map::new();
    let mut healthy = true;

    // memory store (always probed)
    match state.store.ping().await {
        Ok(()) => {
            services.insert(
                "store".into(),
                json!({"status": "healthy", "message": "memory store reachable"}),
            );
        }
        Err(e) => {
            healthy = false;
            error!(error = %e, "store health check failed");
            services.insert(
                "store".into(),
                json!({"status": "unhealthy", "message": format!("unable to reach store: {e}")}),
            );
        }
    }

    // LLM provider (gated)
    if state.config.health.check_llm {
        match state
            .llm
            .generate_structured::<ConnectivityProbe>(
                "You are a connectivity probe.",
                "Respond with JSON {\"connected\": true}.",
            )
            .await
        {
            Ok(probe) if probe.connected => {
                info!("LLM health check passed");
                services.insert(
                    "llm".into(),
                    json!({"status": "healthy", "message": "connected to LLM provider"}),
                );
            }
            Ok(_) => {
                healthy = false;
                services.insert(
                    "llm".into(),
                    json!({"status": "unhealthy", "message": "LLM probe returned connected=false"}),
                );
            }
            Err(e) => {
                healthy = false;
                error!(error = %e, "LLM health check failed");
                services.insert(
                    "llm".into(),
                    json!({"status": "unhealthy", "message": format!("unable to reach LLM: {e}")}),
                );
            }
        }
    } else {
        services.insert(
            "llm".into(),
            json!({"status": "skipped", "message": "LLM health check disabled by config"}),
        );
    }

    // embedding provider
    match state
        .embedder
        .embed(&["ping".to_string()], EmbeddingTask::RetrievalQuery)
        .await
    {
        Ok(vectors) if !vectors.is_empty() => {
            services.insert(
                "embedding".into(),
                json!({"status": "healthy", "message": "embedding provider reachable"}),
            );
        }
        Ok(_) => {
            healthy = false;
            services.insert(
                "embedding".into(),
                json!({"status": "unhealthy", "message": "embedding provider returned no vectors"}),
            );
        }
        Err(e) => {
            healthy = false;
            error!(error = %e, "embedding health check failed");
            services.insert(
                "embedding".into(),
                json!({"status": "unhealthy", "message": format!("unable to reach embedding provider: {e}")}),
            );
        }
    }

    // device portal
    match state.device.ping().await {
        Ok(info) => {
            services.insert(
                "device".into(),
                json!({
                    "status": "healthy",
                    "message": "connected to device portal",
                    "portal_version": info.version,
                    "device_serial": info.device_serial,
                }),
            );
        }
        Err(e) => {
            healthy = false;
            error!(error = %e, "device health check failed");
            services.insert(
                "device".into(),
                json!({"status": "unhealthy", "message": format!("device connection lost: {e}")}),
            );
        }
    }

    Json(json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "services": services,
    }))
}
