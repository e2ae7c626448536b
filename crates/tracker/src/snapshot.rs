//! Transition records and the compact snapshot form handed to inference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use valet_device::{StateChangeKind, UiState};

/// Where a state change came from: passive observation of the device, or a
/// command the service itself executed. The background tracker only ever
/// records observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Observation,
    Command,
}

/// A classified transition between two UI states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiStateChange {
    pub timestamp: DateTime<Utc>,
    pub change_kind: StateChangeKind,
    pub before: UiState,
    pub after: UiState,
    pub source: ChangeSource,
}

impl UiStateChange {
    pub fn observed(before: UiState, after: UiState, change_kind: StateChangeKind) -> Self {
        Self {
            timestamp: Utc::now(),
            change_kind,
            before,
            after,
            source: ChangeSource::Observation,
        }
    }
}

/// The compact form the inferencer consumes: denoised screen text plus the
/// app context and an app-switch marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSnapshot {
    pub text: String,
    pub activity: String,
    pub package: String,
    pub timestamp: DateTime<Utc>,
    pub is_app_switch: bool,
}

impl UiSnapshot {
    pub fn from_change(change: &UiStateChange) -> Self {
        let is_app_switch = change.change_kind == StateChangeKind::AppSwitch;
        let text = if is_app_switch {
            format!(
                "APP SWITCH: from {} to {}\n{}",
                change.before.package, change.after.package, change.after.denoised_text
            )
        } else {
            change.after.denoised_text.clone()
        };
        Self {
            text,
            activity: change.after.activity.clone(),
            package: change.after.package.clone(),
            timestamp: change.timestamp,
            is_app_switch,
        }
    }

    /// Render one snapshot as a prompt block.
    pub fn render(&self) -> String {
        format!(
            "[{} | {} / {}]\n{}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.package,
            self.activity,
            self.text
        )
    }
}
