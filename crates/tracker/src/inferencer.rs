//! Observation inference over snapshot windows.
//!
//! Two-step policy: try to fold new snapshots into the current tail
//! observation first; only when the model reports no meaningful update is a
//! fresh observation attempted. The model is told to return null rather
//! than speculate, so both paths are expected to come back empty most of
//! the time.

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use valet_llm::{LlmClient, StructuredCallError};
use valet_memory::Observation;

use crate::snapshot::UiSnapshot;

const CREATE_SYSTEM_PROMPT: &str = "\
You watch a stream of Android screen snapshots and distill recurring user \
behavior into one-sentence observations. Only form an observation when at \
least three related snapshots show the same pattern (same app, same kind of \
activity, same person or content). Name concrete apps, people, and content. \
If the snapshots do not show a recurring pattern, set observation_node to \
null — never speculate. Respond as JSON with fields observation_node \
(string or null) and reasoning (string).";

const UPDATE_SYSTEM_PROMPT: &str = "\
You maintain an existing behavioral observation about the user. Given the \
current observation and a window of new Android screen snapshots, decide \
whether the new snapshots are evidence of the same pattern. If they are, \
return a refined observation sentence in updated_observation_node and set \
is_updated to true. If they describe a different pattern, different people, \
or there is not enough evidence, set is_updated to false and \
updated_observation_node to null. Respond as JSON with fields \
updated_observation_node (string or null), is_updated (boolean), and \
reasoning (string).";

#[derive(Debug, Deserialize, JsonSchema)]
struct NewObservationResponse {
    /// Semantic meaning of the observation, or null when nothing recurring
    /// was seen.
    observation_node: Option<String>,
    reasoning: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdatedObservationResponse {
    updated_observation_node: Option<String>,
    is_updated: bool,
    reasoning: String,
}

pub struct ObservationInferencer {
    llm: LlmClient,
}

impl ObservationInferencer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Infer a brand-new observation from a snapshot window. `None` when
    /// the model saw nothing recurring.
    pub async fn create_new_observation(
        &self,
        snapshots: &[UiSnapshot],
    ) -> Result<Option<Observation>, StructuredCallError> {
        let user_prompt = render_snapshots(snapshots);
        let response: NewObservationResponse = self
            .llm
            .generate_structured(CREATE_SYSTEM_PROMPT, &user_prompt)
            .await?;

        info!(
            node = response.observation_node.as_deref().unwrap_or("<none>"),
            reasoning = %response.reasoning,
            "new observation inference"
        );

        Ok(response
            .observation_node
            .filter(|node| !node.trim().is_empty())
            .map(|node| Observation::short_term_preference(dominant_package(snapshots), node)))
    }

    /// Try to fold new snapshots into the current observation. `None` when
    /// the model reports no meaningful update.
    pub async fn update_observation(
        &self,
        current: &Observation,
        snapshots: &[UiSnapshot],
    ) -> Result<Option<Observation>, StructuredCallError> {
        let user_prompt = format!(
            "Current observation:\n{}\n\nNew snapshots:\n{}",
            current.node(),
            render_snapshots(snapshots)
        );
        let response: UpdatedObservationResponse = self
            .llm
            .generate_structured(UPDATE_SYSTEM_PROMPT, &user_prompt)
            .await?;

        info!(
            is_updated = response.is_updated,
            node = response.updated_observation_node.as_deref().unwrap_or("<none>"),
            reasoning = %response.reasoning,
            "update observation inference"
        );

        if !response.is_updated {
            return Ok(None);
        }
        Ok(response
            .updated_observation_node
            .filter(|node| !node.trim().is_empty())
            .map(|node| Observation::short_term_preference(dominant_package(snapshots), node)))
    }
}

fn render_snapshots(snapshots: &[UiSnapshot]) -> String {
    snapshots
        .iter()
        .map(UiSnapshot::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Most frequent package in the window, used as the observation's source
/// entity.
fn dominant_package(snapshots: &[UiSnapshot]) -> String {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for snapshot in snapshots {
        *counts.entry(snapshot.package.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(package, _)| package.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
