//! Device driver contract and the HTTP portal implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use valet_config::DeviceConfig;

use crate::denoise::denoise_formatted_text;
use crate::state::{CommandRequest, RawExecutionResult, UiElement, UiState};

/// Maximum number of denoised lines kept from one accessibility dump.
const DENOISE_MAX_LINES: usize = 50;

/// Extra wall-clock slack granted to the HTTP request beyond the device-side
/// command timeout.
const COMMAND_HTTP_SLACK_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device not connected: {0}")]
    NotConnected(String),
    #[error("device transport error: {0}")]
    Transport(String),
    #[error("unexpected portal payload: {0}")]
    Protocol(String),
}

/// Portal version info returned by `ping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalInfo {
    pub version: String,
    #[serde(default)]
    pub device_serial: Option<String>,
}

/// The device control surface. `get_state` must stay cheap — the tracker
/// polls it at 1 Hz; `execute_command` is synchronous from the caller's
/// view and may take minutes.
#[async_trait::async_trait]
pub trait DeviceDriver: Send + Sync {
    async fn get_state(&self) -> Result<UiState, DeviceError>;
    async fn execute_command(
        &self,
        request: CommandRequest,
    ) -> Result<RawExecutionResult, DeviceError>;
    async fn ping(&self) -> Result<PortalInfo, DeviceError>;
}

/// HTTP client for the on-device portal. Reconnects transparently on entry
/// to every call; a lost connection is re-established with bounded attempts
/// before the call proceeds or fails.
pub struct HttpDeviceDriver {
    client: reqwest::Client,
    base_url: String,
    connect_attempts: usize,
    default_timeout_secs: u64,
    connected: AtomicBool,
}

impl HttpDeviceDriver {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            connect_attempts: config.connect_attempts.max(1),
            default_timeout_secs: config.command_timeout_secs,
            connected: AtomicBool::new(false),
        }
    }

    async fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut last_error = String::new();
        for attempt in 1..=self.connect_attempts {
            match self.raw_ping().await {
                Ok(info) => {
                    info!(version = %info.version, "device portal connected");
                    self.connected.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "device connection attempt failed");
                    last_error = e.to_string();
                    if attempt < self.connect_attempts {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }
        Err(DeviceError::NotConnected(last_error))
    }

    async fn raw_ping(&self) -> Result<PortalInfo, DeviceError> {
        let body: serde_json::Value = self
            .client
            .get(format!("{}/ping", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        serde_json::from_value(body).map_err(|e| DeviceError::Protocol(e.to_string()))
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DeviceDriver for HttpDeviceDriver {
    async fn get_state(&self) -> Result<UiState, DeviceError> {
        self.ensure_connected().await?;

        let response = self
            .client
            .get(format!("{}/state", self.base_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                self.mark_disconnected();
                DeviceError::Transport(e.to_string())
            })?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;

        parse_state_payload(&body)
    }

    async fn execute_command(
        &self,
        request: CommandRequest,
    ) -> Result<RawExecutionResult, DeviceError> {
        self.ensure_connected().await?;

        let timeout_secs = request.timeout_secs.unwrap_or(self.default_timeout_secs);
        let payload = serde_json::json!({
            "command": request.command,
            "reasoning": request.reasoning.unwrap_or(false),
            "timeout": timeout_secs,
        });

        let outcome = self
            .client
            .post(format!("{}/execute", self.base_url))
            .timeout(Duration::from_secs(timeout_secs + COMMAND_HTTP_SLACK_SECS))
            .json(&payload)
            .send()
            .await;

        let body: serde_json::Value = match outcome {
            Ok(response) => response
                .json()
                .await
                .map_err(|e| DeviceError::Transport(e.to_string()))?,
            Err(e) => {
                // a command that never reached the device is a failed
                // execution, not an infrastructure error for the caller
                self.mark_disconnected();
                warn!(error = %e, "command transport failed");
                return Ok(RawExecutionResult {
                    timestamp: Utc::now(),
                    command: request.command,
                    success: false,
                    reason: Some(format!("device transport error: {e}")),
                    steps: 0,
                });
            }
        };

        Ok(RawExecutionResult {
            timestamp: Utc::now(),
            command: request.command,
            success: body.get("success").and_then(|v| v.as_bool()).unwrap_or(false),
            reason: body
                .get("reason")
                .and_then(|v| v.as_str())
                .map(ToString::to_string),
            steps: body.get("steps").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        })
    }

    async fn ping(&self) -> Result<PortalInfo, DeviceError> {
        self.ensure_connected().await?;
        match self.raw_ping().await {
            Ok(info) => Ok(info),
            Err(e) => {
                self.mark_disconnected();
                Err(e)
            }
        }
    }
}

/// Parse the portal's `get_state` payload into a [`UiState`], denoising the
/// formatted accessibility text along the way.
fn parse_state_payload(body: &serde_json::Value) -> Result<UiState, DeviceError> {
    let phone_state = body
        .get("phone_state")
        .ok_or_else(|| DeviceError::Protocol("missing phone_state".to_string()))?;
    let package = phone_state
        .get("packageName")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DeviceError::Protocol("missing packageName".to_string()))?;
    let activity = phone_state
        .get("activityName")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let focused = body.get("focused_id").and_then(|v| v.as_i64());

    let elements = body
        .get("ui_elements")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(UiElement {
                        index: item.get("index")?.as_i64()?,
                        kind: item
                            .get("class")
                            .and_then(|v| v.as_str())
                            .unwrap_or("View")
                            .to_string(),
                        text: item
                            .get("text")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let formatted = body
        .get("formatted_text")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let denoised = denoise_formatted_text(formatted, DENOISE_MAX_LINES);

    Ok(UiState::new(
        package,
        activity,
        focused,
        elements,
        denoised,
        body.clone(),
    ))
}
