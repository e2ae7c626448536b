//! Memory data model: observations, persisted rows, and people records.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator on an observation — which memory structure it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Interpersonal relationships — anything about a named person or group.
    LongTermPeople,
    /// Established recurring usage patterns.
    LongTermPreferences,
    /// Recent behavioral signals.
    ShortTermPreferences,
    /// Recently viewed documents or media.
    ShortTermContent,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::LongTermPeople => "long_term_people",
            MemoryType::LongTermPreferences => "long_term_preferences",
            MemoryType::ShortTermPreferences => "short_term_preferences",
            MemoryType::ShortTermContent => "short_term_content",
        }
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "long_term_people" => Ok(MemoryType::LongTermPeople),
            "long_term_preferences" => Ok(MemoryType::LongTermPreferences),
            "short_term_preferences" => Ok(MemoryType::ShortTermPreferences),
            "short_term_content" => Ok(MemoryType::ShortTermContent),
            other => Err(format!("unknown memory type '{other}'")),
        }
    }
}

/// A durable behavioral inference derived from a window of UI snapshots.
///
/// The variant is the memory type; `node` is always the free-text summary
/// and `importance` stays within `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "memory_type", rename_all = "snake_case")]
pub enum Observation {
    LongTermPeople {
        id: Uuid,
        created_at: DateTime<Utc>,
        importance: f32,
        /// Unique id of the person this observation is about.
        target_id: String,
        /// Semantic classification of the node w.r.t. the target.
        edge: Option<String>,
        node: String,
        primary_communication_channel: String,
    },
    LongTermPreferences {
        id: Uuid,
        created_at: DateTime<Utc>,
        importance: f32,
        /// Id of the app or workflow the preference concerns.
        source_id: String,
        edge: Option<String>,
        node: String,
        /// Number of occurrences recorded for this preference.
        recurrence: u32,
    },
    ShortTermPreferences {
        id: Uuid,
        created_at: DateTime<Utc>,
        importance: f32,
        source_id: String,
        edge: Option<String>,
        node: String,
        recurrence: u32,
    },
    ShortTermContent {
        id: Uuid,
        created_at: DateTime<Utc>,
        importance: f32,
        source_id: String,
        content_id: String,
        node: String,
    },
}

impl Observation {
    /// Freshly minted short-term preference — the default variant for newly
    /// inferred observations.
    pub fn short_term_preference(source_id: impl Into<String>, node: impl Into<String>) -> Self {
        Observation::ShortTermPreferences {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            importance: 1.0,
            source_id: source_id.into(),
            edge: None,
            node: node.into(),
            recurrence: 1,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Observation::LongTermPeople { id, .. }
            | Observation::LongTermPreferences { id, .. }
            | Observation::ShortTermPreferences { id, .. }
            | Observation::ShortTermContent { id, .. } => *id,
        }
    }

    pub fn node(&self) -> &str {
        match self {
            Observation::LongTermPeople { node, .. }
            | Observation::LongTermPreferences { node, .. }
            | Observation::ShortTermPreferences { node, .. }
            | Observation::ShortTermContent { node, .. } => node,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Observation::LongTermPeople { created_at, .. }
            | Observation::LongTermPreferences { created_at, .. }
            | Observation::ShortTermPreferences { created_at, .. }
            | Observation::ShortTermContent { created_at, .. } => *created_at,
        }
    }

    pub fn importance(&self) -> f32 {
        match self {
            Observation::LongTermPeople { importance, .. }
            | Observation::LongTermPreferences { importance, .. }
            | Observation::ShortTermPreferences { importance, .. }
            | Observation::ShortTermContent { importance, .. } => *importance,
        }
    }

    pub fn memory_type(&self) -> MemoryType {
        match self {
            Observation::LongTermPeople { .. } => MemoryType::LongTermPeople,
            Observation::LongTermPreferences { .. } => MemoryType::LongTermPreferences,
            Observation::ShortTermPreferences { .. } => MemoryType::ShortTermPreferences,
            Observation::ShortTermContent { .. } => MemoryType::ShortTermContent,
        }
    }

    /// Flatten into the wide structured-store row: the discriminator and the
    /// variant's fields, nulls where inapplicable.
    pub fn to_row(&self) -> ObservationRow {
        match self {
            Observation::LongTermPeople {
                id,
                created_at,
                importance,
                target_id,
                edge,
                node,
                ..
            } => ObservationRow {
                id: *id,
                memory_type: MemoryType::LongTermPeople,
                node_content: node.clone(),
                edge_type: edge.clone(),
                source_entity_id: Some("me".to_string()),
                source_entity_type: Some("user".to_string()),
                target_entity_id: Some(target_id.clone()),
                target_entity_type: Some("person".to_string()),
                created_at: *created_at,
                updated_at: *created_at,
                importance: *importance,
                recurrence: 1,
            },
            Observation::LongTermPreferences {
                id,
                created_at,
                importance,
                source_id,
                edge,
                node,
                recurrence,
            }
            | Observation::ShortTermPreferences {
                id,
                created_at,
                importance,
                source_id,
                edge,
                node,
                recurrence,
            } => ObservationRow {
                id: *id,
                memory_type: self.memory_type(),
                node_content: node.clone(),
                edge_type: edge.clone(),
                source_entity_id: Some(source_id.clone()),
                source_entity_type: Some("app".to_string()),
                target_entity_id: None,
                target_entity_type: None,
                created_at: *created_at,
                updated_at: *created_at,
                importance: *importance,
                recurrence: *recurrence,
            },
            Observation::ShortTermContent {
                id,
                created_at,
                importance,
                source_id,
                content_id,
                node,
            } => ObservationRow {
                id: *id,
                memory_type: MemoryType::ShortTermContent,
                node_content: node.clone(),
                edge_type: None,
                source_entity_id: Some(source_id.clone()),
                source_entity_type: Some("content_source".to_string()),
                target_entity_id: Some(content_id.clone()),
                target_entity_type: Some("content".to_string()),
                created_at: *created_at,
                updated_at: *created_at,
                importance: *importance,
                recurrence: 1,
            },
        }
    }
}

/// Wide structured-store row for observations. A full-text index is
/// maintained over `node_content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRow {
    pub id: Uuid,
    pub memory_type: MemoryType,
    pub node_content: String,
    pub edge_type: Option<String>,
    pub source_entity_id: Option<String>,
    pub source_entity_type: Option<String>,
    pub target_entity_id: Option<String>,
    pub target_entity_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub importance: f32,
    pub recurrence: u32,
}

/// A person the user interacts with, plus the embedded relationship summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    /// Denormalized; mirrors `first_name` for mononyms. Trigram-indexed.
    pub full_name: String,
    /// Platform context for same-name disambiguation, e.g. "instagram".
    pub platform: Option<String>,
    /// e.g. "@sarah_smith", "sarah@example.com".
    pub platform_handle: Option<String>,
    pub relationship_description: String,
    pub relationship_vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_interacted_at: Option<DateTime<Utc>>,
    pub interaction_count: u32,
}

/// One fuzzy-name lookup hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonNameMatch {
    pub full_name: String,
    pub relationship_description: String,
    pub similarity_score: f32,
}

/// A semantic-memory row: the embedded observation text keyed by the owning
/// observation's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    pub observation_text: String,
    pub embedding_vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub observation_id: Uuid,
}

impl EmbeddingRecord {
    pub fn new(observation_id: Uuid, observation_text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: observation_id,
            observation_text: observation_text.into(),
            embedding_vector: vector,
            created_at: Utc::now(),
            observation_id,
        }
    }
}

/// Distance metric for nearest-neighbor search over embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    L2,
    InnerProduct,
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" => Ok(DistanceMetric::L2),
            "inner_product" => Ok(DistanceMetric::InnerProduct),
            other => Err(format!(
                "invalid distance metric '{other}': use 'cosine', 'l2', or 'inner_product'"
            )),
        }
    }
}
