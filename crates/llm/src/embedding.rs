//! Text embedding client.
//!
//! Embeddings are task-typed: documents are embedded for storage with
//! `RETRIEVAL_DOCUMENT`, queries with `RETRIEVAL_QUERY`, so the provider can
//! apply asymmetric encodings.

use serde_json::json;
use tracing::debug;

use valet_config::EmbeddingConfig;

use crate::LlmError;

const API_KEY_ENV: &str = "VALET_EMBEDDING_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    RetrievalDocument,
    RetrievalQuery,
}

impl EmbeddingTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingTask::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// The embedding seam. The HTTP client implements this for production;
/// tests substitute deterministic fakes.
#[async_trait::async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(
        &self,
        texts: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, LlmError>;
}

#[derive(Debug, Clone)]
pub struct HttpTextEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpTextEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }
}

#[async_trait::async_trait]
impl TextEmbedder for HttpTextEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let Ok(api_key) = std::env::var(API_KEY_ENV) else {
            return Err(LlmError::Transport(format!(
                "missing API key: set {API_KEY_ENV}"
            )));
        };

        let endpoint = format!("{}/embeddings", self.base_url);
        debug!(endpoint = %endpoint, count = texts.len(), task = task.as_str(), "embedding request");

        let payload = json!({
            "model": self.model,
            "input": texts,
            "task_type": task.as_str(),
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Provider {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        parse_embeddings(&body, texts.len())
    }
}

fn parse_embeddings(
    body: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, LlmError> {
    let data = body
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| LlmError::Malformed("embedding response missing data".to_string()))?;

    let mut vectors = Vec::with_capacity(data.len());
    for entry in data {
        let values = entry
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| LlmError::Malformed("entry missing embedding".to_string()))?;
        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect();
        if vector.len() != values.len() {
            return Err(LlmError::Malformed("non-numeric embedding value".to_string()));
        }
        vectors.push(vector);
    }

    if vectors.len() != expected {
        return Err(LlmError::Malformed(format!(
            "expected {expected} embeddings, provider returned {}",
            vectors.len()
        )));
    }
    Ok(vectors)
}
