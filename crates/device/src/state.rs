//! Canonical device state and execution result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One clickable element from the accessibility tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiElement {
    pub index: i64,
    /// Element class, e.g. "Button", "EditText".
    pub kind: String,
    /// Human-readable label, empty when the element carries none.
    #[serde(default)]
    pub text: String,
}

/// A snapshot of the device UI at one instant. Immutable once constructed;
/// each snapshot gets a freshly minted `state_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiState {
    pub state_id: Uuid,
    pub package: String,
    pub activity: String,
    /// Index of the focused element, absent when nothing holds focus.
    pub focused_element: Option<i64>,
    pub elements: Vec<UiElement>,
    /// Denoised, human-readable rendering of the accessibility tree.
    pub denoised_text: String,
    /// Opaque raw tree payload as the portal delivered it.
    pub raw_tree: serde_json::Value,
}

impl UiState {
    pub fn new(
        package: impl Into<String>,
        activity: impl Into<String>,
        focused_element: Option<i64>,
        elements: Vec<UiElement>,
        denoised_text: impl Into<String>,
        raw_tree: serde_json::Value,
    ) -> Self {
        Self {
            state_id: Uuid::new_v4(),
            package: package.into(),
            activity: activity.into(),
            focused_element,
            elements,
            denoised_text: denoised_text.into(),
            raw_tree,
        }
    }
}

/// Classification of a transition between two UI states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateChangeKind {
    AppSwitch,
    Changed,
    NoChange,
}

/// Deterministic transition classifier: a package change is an app switch;
/// same package, activity, and focus is no change; anything else is a
/// plain change.
pub fn classify_transition(before: &UiState, after: &UiState) -> StateChangeKind {
    if before.package != after.package {
        return StateChangeKind::AppSwitch;
    }
    if before.activity == after.activity && before.focused_element == after.focused_element {
        return StateChangeKind::NoChange;
    }
    StateChangeKind::Changed
}

/// A natural-language command for the device, with optional execution flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    /// Enable step-by-step reasoning on the device agent for complex commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<bool>,
    /// Per-command timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), reasoning: None, timeout_secs: None }
    }
}

/// Bare result of a single command execution as the portal reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExecutionResult {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    pub steps: u32,
}

/// Execution result enriched with the surrounding UI state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    #[serde(flatten)]
    pub result: RawExecutionResult,
    pub state_before: UiState,
    pub state_after: UiState,
    pub change_kind: StateChangeKind,
}

impl ExecutionReport {
    pub fn new(result: RawExecutionResult, state_before: UiState, state_after: UiState) -> Self {
        let change_kind = classify_transition(&state_before, &state_after);
        Self { result, state_before, state_after, change_kind }
    }
}
