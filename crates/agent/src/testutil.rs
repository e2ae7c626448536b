//! Shared fakes for agent tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;

use valet_device::{
    CommandRequest, DeviceDriver, DeviceError, PortalInfo, RawExecutionResult, UiState,
};

/// Device fake that records every command and reports a scripted outcome.
pub(crate) struct RecordingDevice {
    pub commands: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
    pub fail_with: Option<String>,
}

impl RecordingDevice {
    pub fn succeeding() -> Self {
        Self { commands: Mutex::new(vec![]), calls: AtomicUsize::new(0), fail_with: None }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            commands: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
            fail_with: Some(reason.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl DeviceDriver for RecordingDevice {
    async fn get_state(&self) -> Result<UiState, DeviceError> {
        Ok(UiState::new("com.android.launcher", "Home", None, vec![], "", json!(null)))
    }

    async fn execute_command(
        &self,
        request: CommandRequest,
    ) -> Result<RawExecutionResult, DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.commands.lock().unwrap().push(request.command.clone());
        Ok(RawExecutionResult {
            timestamp: Utc::now(),
            command: request.command,
            success: self.fail_with.is_none(),
            reason: self.fail_with.clone(),
            steps: 1,
        })
    }

    async fn ping(&self) -> Result<PortalInfo, DeviceError> {
        Ok(PortalInfo { version: "test".into(), device_serial: None })
    }
}
