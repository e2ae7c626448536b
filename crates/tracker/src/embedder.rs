//! Embed-and-persist step for rotated observations.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use uuid::Uuid;

use valet_llm::{EmbeddingTask, TextEmbedder};
use valet_memory::{EmbeddingRecord, VectorStore};

/// Embeds an observation's node text and writes the row to the vector
/// store, keyed by the observation id. Failures are logged and re-raised;
/// the tracker treats a failed flush as a tolerable loss of that single
/// observation from semantic memory.
pub struct EmbeddingGenerator {
    embedder: Arc<dyn TextEmbedder>,
    vector: Arc<dyn VectorStore>,
}

impl EmbeddingGenerator {
    pub fn new(embedder: Arc<dyn TextEmbedder>, vector: Arc<dyn VectorStore>) -> Self {
        Self { embedder, vector }
    }

    pub async fn generate_and_save(
        &self,
        observation_id: Uuid,
        observation_text: &str,
    ) -> Result<()> {
        let vectors = self
            .embedder
            .embed(
                &[observation_text.to_string()],
                EmbeddingTask::RetrievalDocument,
            )
            .await
            .inspect_err(|e| error!(%observation_id, error = %e, "failed to embed observation"))
            .context("embedding provider call failed")?;

        let Some(vector) = vectors.into_iter().next() else {
            error!(%observation_id, "embedding provider returned no vector");
            bail!("embedding provider returned no vector");
        };

        self.vector
            .insert_embedding(EmbeddingRecord::new(observation_id, observation_text, vector))
            .await
            .inspect_err(|e| error!(%observation_id, error = %e, "failed to persist embedding"))
            .context("vector store write failed")?;

        info!(%observation_id, "observation embedded and persisted");
        Ok(())
    }
}
