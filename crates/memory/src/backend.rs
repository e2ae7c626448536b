//! In-process store backends.
//!
//! These implement the store seams over plain vectors behind a mutex —
//! enough for a single-process deployment and for deterministic tests. A
//! SQL/pgvector binding would implement the same traits.

use std::sync::Mutex;

use tracing::debug;
use uuid::Uuid;

use crate::model::{
    DistanceMetric, EmbeddingRecord, MemoryType, ObservationRow, PersonNameMatch, PersonRecord,
};
use crate::store::{StoreError, StructuredStore, VectorStore};
use crate::text::{distance, fulltext_rank, tokenize, trigram_similarity};

#[derive(Default)]
pub struct InMemoryStructuredStore {
    rows: Mutex<Vec<ObservationRow>>,
}

impl InMemoryStructuredStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<ObservationRow>>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Backend("structured store poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl StructuredStore for InMemoryStructuredStore {
    async fn insert_observation(&self, row: ObservationRow) -> Result<(), StoreError> {
        debug!(id = %row.id, memory_type = row.memory_type.as_str(), "insert observation row");
        self.lock()?.push(row);
        Ok(())
    }

    async fn by_memory_type(
        &self,
        memory_type: MemoryType,
        source_entity_id: Option<&str>,
        target_entity_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        let rows = self.lock()?;
        let mut matches: Vec<ObservationRow> = rows
            .iter()
            .filter(|r| r.memory_type == memory_type)
            .filter(|r| match source_entity_id {
                Some(id) => r.source_entity_id.as_deref() == Some(id),
                None => true,
            })
            .filter(|r| match target_entity_id {
                Some(id) => r.target_entity_id.as_deref() == Some(id),
                None => true,
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn by_entity(
        &self,
        entity_id: &str,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        let rows = self.lock()?;
        let mut matches: Vec<ObservationRow> = rows
            .iter()
            .filter(|r| {
                let as_source = r.source_entity_id.as_deref() == Some(entity_id)
                    && entity_type
                        .map(|t| r.source_entity_type.as_deref() == Some(t))
                        .unwrap_or(true);
                let as_target = r.target_entity_id.as_deref() == Some(entity_id)
                    && entity_type
                        .map(|t| r.target_entity_type.as_deref() == Some(t))
                        .unwrap_or(true);
                as_source || as_target
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn fulltext_search(
        &self,
        query: &str,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<(ObservationRow, f32)>, StoreError> {
        let query_terms = tokenize(query);
        let rows = self.lock()?;
        let mut ranked: Vec<(ObservationRow, f32)> = rows
            .iter()
            .filter(|r| memory_type.map(|mt| r.memory_type == mt).unwrap_or(true))
            .filter_map(|r| {
                let rank = fulltext_rank(&r.node_content, &query_terms);
                (rank > 0.0).then(|| (r.clone(), rank))
            })
            .collect();
        ranked.sort_by(|(ra, sa), (rb, sb)| {
            sb.total_cmp(sa).then(rb.created_at.cmp(&ra.created_at))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn top_relevant(
        &self,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        let rows = self.lock()?;
        let mut matches: Vec<ObservationRow> = rows
            .iter()
            .filter(|r| memory_type.map(|mt| r.memory_type == mt).unwrap_or(true))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            let score_a = a.importance * a.recurrence as f32;
            let score_b = b.importance * b.recurrence as f32;
            score_b.total_cmp(&score_a)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    embeddings: Mutex<Vec<EmbeddingRecord>>,
    people: Mutex<Vec<PersonRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_embeddings(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Vec<EmbeddingRecord>>, StoreError> {
        self.embeddings
            .lock()
            .map_err(|_| StoreError::Backend("vector store poisoned".to_string()))
    }

    fn lock_people(&self) -> Result<std::sync::MutexGuard<'_, Vec<PersonRecord>>, StoreError> {
        self.people
            .lock()
            .map_err(|_| StoreError::Backend("vector store poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert_embedding(&self, record: EmbeddingRecord) -> Result<(), StoreError> {
        debug!(id = %record.id, "insert embedding row");
        self.lock_embeddings()?.push(record);
        Ok(())
    }

    async fn insert_person(&self, record: PersonRecord) -> Result<(), StoreError> {
        self.lock_people()?.push(record);
        Ok(())
    }

    async fn similar_texts(
        &self,
        query_vector: &[f32],
        limit: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<(EmbeddingRecord, f32)>, StoreError> {
        let embeddings = self.lock_embeddings()?;
        let mut scored: Vec<(EmbeddingRecord, f32)> = embeddings
            .iter()
            .map(|r| {
                let d = distance(query_vector, &r.embedding_vector, metric);
                (r.clone(), d)
            })
            .collect();
        scored.sort_by(|(_, da), (_, db)| da.total_cmp(db));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn embedding_by_observation_id(
        &self,
        observation_id: Uuid,
    ) -> Result<Option<EmbeddingRecord>, StoreError> {
        let embeddings = self.lock_embeddings()?;
        Ok(embeddings
            .iter()
            .find(|r| r.observation_id == observation_id)
            .cloned())
    }

    async fn person_by_id(&self, person_id: &str) -> Result<Option<PersonRecord>, StoreError> {
        let people = self.lock_people()?;
        Ok(people.iter().find(|p| p.id == person_id).cloned())
    }

    async fn people_by_name(
        &self,
        name: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<PersonNameMatch>, StoreError> {
        let people = self.lock_people()?;
        let mut matches: Vec<PersonNameMatch> = people
            .iter()
            .filter_map(|p| {
                let score = trigram_similarity(&p.full_name, name);
                (score >= threshold).then(|| PersonNameMatch {
                    full_name: p.full_name.clone(),
                    relationship_description: p.relationship_description.clone(),
                    similarity_score: score,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn similar_relationships(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(PersonRecord, f32)>, StoreError> {
        let people = self.lock_people()?;
        let mut scored: Vec<(PersonRecord, f32)> = people
            .iter()
            .map(|p| {
                let d = distance(query_vector, &p.relationship_vector, DistanceMetric::Cosine);
                (p.clone(), d)
            })
            .collect();
        scored.sort_by(|(_, da), (_, db)| da.total_cmp(db));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock_embeddings().map(|_| ())
    }
}
