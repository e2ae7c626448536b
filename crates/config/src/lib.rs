use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Bounded retries for structured-output validation failures.
    pub retry_attempts: usize,
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            retry_attempts: 2,
            retry_backoff_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Dimension of observation-text embeddings.
    pub text_dims: usize,
    /// Dimension of relationship-description embeddings.
    pub people_dims: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/text-embedding-3-small".to_string(),
            text_dims: 768,
            people_dims: 1536,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub base_url: String,
    /// Reconnect attempts made on entry to each driver call.
    pub connect_attempts: usize,
    /// Default per-command timeout, seconds.
    pub command_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9327".to_string(),
            connect_attempts: 3,
            command_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Write observations to the structured store as well as the vector
    /// store on rotation. Disable for parity with vector-only persistence.
    pub persist_structured: bool,
    /// Cosine similarity a cached query vector must reach for a semantic
    /// cache hit.
    pub semantic_cache_threshold: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            persist_structured: true,
            semantic_cache_threshold: 0.70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds between device polls when the screen is quiet.
    pub poll_interval_secs: f64,
    /// Snapshots accumulated before an inference pass runs.
    pub context_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1.0,
            context_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Execute→re-retrieve rounds before the orchestrator gives up.
    pub max_iterations: usize,
    /// Tool-call turns per agent invocation.
    pub max_turns: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_turns: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HealthConfig {
    /// Probe the LLM provider during /health. Off by default to avoid
    /// burning quota on every check.
    pub check_llm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub device: DeviceConfig,
    pub memory: MemoryConfig,
    pub tracker: TrackerConfig,
    pub agent: AgentConfig,
    pub health: HealthConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file is absent. Environment overrides are applied last so a
    /// deployment can repoint endpoints without editing the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("VALET_LLM_BASE_URL") {
            if !value.is_empty() {
                config.llm.base_url = value;
            }
        }
        if let Ok(value) = env::var("VALET_EMBEDDING_BASE_URL") {
            if !value.is_empty() {
                config.embedding.base_url = value;
            }
        }
        if let Ok(value) = env::var("VALET_DEVICE_BASE_URL") {
            if !value.is_empty() {
                config.device.base_url = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}
