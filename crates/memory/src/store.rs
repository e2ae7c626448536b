//! Store seams and the facade over the two persistence backends.

use std::sync::Arc;

use uuid::Uuid;

use crate::model::{
    DistanceMetric, EmbeddingRecord, MemoryType, ObservationRow, PersonNameMatch, PersonRecord,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Typed observation rows with an entity index and full-text search.
#[async_trait::async_trait]
pub trait StructuredStore: Send + Sync {
    async fn insert_observation(&self, row: ObservationRow) -> Result<(), StoreError>;

    /// Lookup by memory type, optionally narrowed by source/target entity.
    async fn by_memory_type(
        &self,
        memory_type: MemoryType,
        source_entity_id: Option<&str>,
        target_entity_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError>;

    /// All observations mentioning an entity, across memory types.
    async fn by_entity(
        &self,
        entity_id: &str,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError>;

    /// Full-text search on `node_content`; returns `(row, rank)` pairs,
    /// best rank first.
    async fn fulltext_search(
        &self,
        query: &str,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<(ObservationRow, f32)>, StoreError>;

    /// Top rows by `importance * recurrence`.
    async fn top_relevant(
        &self,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Embedding rows plus interpersonal-relationship rows with a trigram name
/// index.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert_embedding(&self, record: EmbeddingRecord) -> Result<(), StoreError>;

    /// External-ingestion seam for people rows; the core only reads them.
    async fn insert_person(&self, record: PersonRecord) -> Result<(), StoreError>;

    /// k-NN over observation embeddings; `(record, distance)` closest first.
    async fn similar_texts(
        &self,
        query_vector: &[f32],
        limit: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<(EmbeddingRecord, f32)>, StoreError>;

    async fn embedding_by_observation_id(
        &self,
        observation_id: Uuid,
    ) -> Result<Option<EmbeddingRecord>, StoreError>;

    async fn person_by_id(&self, person_id: &str) -> Result<Option<PersonRecord>, StoreError>;

    /// Trigram fuzzy match on `full_name`; matches at or above `threshold`,
    /// ordered by descending score.
    async fn people_by_name(
        &self,
        name: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<PersonNameMatch>, StoreError>;

    /// Vector-similarity search on `relationship_vector`; `(record,
    /// cosine_distance)` closest first.
    async fn similar_relationships(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(PersonRecord, f32)>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Thin facade bundling both backends. Rows written through either backend
/// are visible to subsequent reads in the same process; per-row write
/// serialization is the backend's job.
#[derive(Clone)]
pub struct MemoryStore {
    structured: Arc<dyn StructuredStore>,
    vector: Arc<dyn VectorStore>,
}

impl MemoryStore {
    pub fn new(structured: Arc<dyn StructuredStore>, vector: Arc<dyn VectorStore>) -> Self {
        Self { structured, vector }
    }

    pub fn structured(&self) -> &Arc<dyn StructuredStore> {
        &self.structured
    }

    pub fn vector(&self) -> &Arc<dyn VectorStore> {
        &self.vector
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.structured.ping().await?;
        self.vector.ping().await
    }
}
