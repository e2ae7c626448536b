//! Read-side facade over the memory store.
//!
//! Each method is the shape the retrieval agent tool-calls. The expensive
//! semantic path (embed + vector search) is fronted by two cache tiers:
//! an exact-match LRU keyed on the raw query string, and a FIFO deque of
//! (query_vector, results) pairs matched by cosine similarity. Fuzzy name
//! lookups get their own exact-match LRU keyed on the normalized name.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::{info, warn};
use uuid::Uuid;

use valet_config::MemoryConfig;
use valet_llm::{EmbeddingTask, TextEmbedder};

use crate::model::{
    DistanceMetric, EmbeddingRecord, MemoryType, ObservationRow, PersonNameMatch, PersonRecord,
};
use crate::store::{MemoryStore, StoreError};
use crate::text::cosine_similarity;

/// Capacity of both exact-match LRU caches.
const EXACT_CACHE_CAPACITY: usize = 50;
/// Capacity of the semantic cache deque.
const SEMANTIC_CACHE_CAPACITY: usize = 10;

pub struct MemoryRetriever {
    store: MemoryStore,
    embedder: Arc<dyn TextEmbedder>,
    semantic_threshold: f32,
    // Each cache carries its own lock; they are independent hot paths.
    exact_cache: Mutex<LruCache<String, Vec<String>>>,
    semantic_cache: Mutex<VecDeque<(Vec<f32>, Vec<String>)>>,
    person_name_cache: Mutex<LruCache<String, Vec<PersonNameMatch>>>,
}

impl MemoryRetriever {
    pub fn new(store: MemoryStore, embedder: Arc<dyn TextEmbedder>, config: &MemoryConfig) -> Self {
        let capacity = NonZeroUsize::new(EXACT_CACHE_CAPACITY).expect("nonzero capacity");
        Self {
            store,
            embedder,
            semantic_threshold: config.semantic_cache_threshold,
            exact_cache: Mutex::new(LruCache::new(capacity)),
            semantic_cache: Mutex::new(VecDeque::with_capacity(SEMANTIC_CACHE_CAPACITY)),
            person_name_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    // ── Structured memory ────────────────────────────────────────────────

    /// Long-term people observations (relationships, contacts).
    pub async fn get_people_relationships(
        &self,
        person_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        self.store
            .structured()
            .by_memory_type(MemoryType::LongTermPeople, None, person_id, limit)
            .await
    }

    /// Long-term preference observations (habitual usage patterns).
    pub async fn get_long_term_preferences(
        &self,
        source_app_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        self.store
            .structured()
            .by_memory_type(MemoryType::LongTermPreferences, source_app_id, None, limit)
            .await
    }

    /// Short-term preference observations (recent behavioral signals).
    pub async fn get_short_term_preferences(
        &self,
        source_app_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        self.store
            .structured()
            .by_memory_type(MemoryType::ShortTermPreferences, source_app_id, None, limit)
            .await
    }

    /// Short-term content observations (recently viewed documents/media).
    pub async fn get_recent_content(
        &self,
        source_id: Option<&str>,
        content_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        self.store
            .structured()
            .by_memory_type(MemoryType::ShortTermContent, source_id, content_id, limit)
            .await
    }

    /// All observations mentioning an entity, across memory types.
    pub async fn get_all_observations_about_entity(
        &self,
        entity_id: &str,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        self.store
            .structured()
            .by_entity(entity_id, entity_type, limit)
            .await
    }

    /// Full-text search across observation content; `(row, rank)` pairs.
    pub async fn search_memories(
        &self,
        query: &str,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<(ObservationRow, f32)>, StoreError> {
        self.store
            .structured()
            .fulltext_search(query, memory_type, limit)
            .await
    }

    /// Highest-relevance observations ranked by importance × recurrence.
    pub async fn get_top_relevant_memories(
        &self,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        self.store.structured().top_relevant(memory_type, limit).await
    }

    // ── People ───────────────────────────────────────────────────────────

    pub async fn get_person_by_id(
        &self,
        person_id: &str,
    ) -> Result<Option<PersonRecord>, StoreError> {
        self.store.vector().person_by_id(person_id).await
    }

    /// Fuzzy name lookup via trigram similarity — handles typos, nicknames,
    /// partial names. Cached by normalized (lowercased, trimmed) name.
    pub async fn find_person_by_name(
        &self,
        name: &str,
        similarity_threshold: f32,
        limit: usize,
    ) -> Result<Vec<PersonNameMatch>, StoreError> {
        let normalized = name.trim().to_lowercase();

        if let Ok(mut cache) = self.person_name_cache.lock() {
            if let Some(hit) = cache.get(&normalized) {
                info!(%name, "person name exact cache hit");
                return Ok(hit.clone());
            }
        }

        let results = self
            .store
            .vector()
            .people_by_name(name, similarity_threshold, limit)
            .await?;

        if let Ok(mut cache) = self.person_name_cache.lock() {
            cache.put(normalized, results.clone());
        }
        Ok(results)
    }

    /// Semantic search over relationship descriptions. Embeds the query
    /// internally; `(record, cosine_distance)` pairs, closest first.
    pub async fn find_similar_person_relationships(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(PersonRecord, f32)>, StoreError> {
        let Some(query_vector) = self.embed_query(query).await else {
            return Ok(vec![]);
        };
        self.store
            .vector()
            .similar_relationships(&query_vector, limit)
            .await
    }

    // ── Semantic similarity over observation texts ───────────────────────

    /// Semantic search across all embedded observations. Returns observation
    /// text strings ordered by similarity. Serves from the exact cache, then
    /// the semantic cache, before touching the embedding provider or store.
    pub async fn find_semantically_similar(
        &self,
        query: &str,
        limit: usize,
        metric: DistanceMetric,
        disable_cache: bool,
    ) -> Result<Vec<String>, StoreError> {
        if disable_cache {
            info!(%query, "skipping caches for semantic query");
            let Some(query_vector) = self.embed_query(query).await else {
                return Ok(vec![]);
            };
            return self.query_similar_texts(&query_vector, limit, metric).await;
        }

        // 1) exact match — skip embedding entirely
        if let Ok(mut cache) = self.exact_cache.lock() {
            if let Some(hit) = cache.get(query) {
                info!(%query, "exact cache hit");
                return Ok(hit.clone());
            }
        }

        let Some(query_vector) = self.embed_query(query).await else {
            return Ok(vec![]);
        };

        // 2) semantic cache — skip store retrieval when a sufficiently
        // similar query was seen before; a hit also promotes to the exact
        // cache so the next identical query is O(1)
        if let Some(cached) = self.find_semantic_cache_hit(&query_vector) {
            info!(%query, "semantic cache hit");
            self.set_exact_cache(query, cached.clone());
            return Ok(cached);
        }

        // 3) miss — hit the store and populate both tiers
        let results = self.query_similar_texts(&query_vector, limit, metric).await?;
        self.set_exact_cache(query, results.clone());
        if let Ok(mut cache) = self.semantic_cache.lock() {
            if cache.len() >= SEMANTIC_CACHE_CAPACITY {
                cache.pop_front();
            }
            cache.push_back((query_vector, results.clone()));
        }
        Ok(results)
    }

    /// Stored embedding for a specific observation.
    pub async fn get_embedding_for_observation(
        &self,
        observation_id: Uuid,
    ) -> Result<Option<EmbeddingRecord>, StoreError> {
        self.store
            .vector()
            .embedding_by_observation_id(observation_id)
            .await
    }

    // ── Cache internals ──────────────────────────────────────────────────

    async fn query_similar_texts(
        &self,
        query_vector: &[f32],
        limit: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<String>, StoreError> {
        let scored = self
            .store
            .vector()
            .similar_texts(query_vector, limit, metric)
            .await?;
        Ok(scored
            .into_iter()
            .map(|(record, _)| record.observation_text)
            .collect())
    }

    /// Embed a single query; failures degrade to `None` with a warning
    /// rather than surfacing an error.
    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        match self
            .embedder
            .embed(&[query.to_string()], EmbeddingTask::RetrievalQuery)
            .await
        {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
            Ok(_) => {
                warn!(%query, "embedding provider returned no vectors");
                None
            }
            Err(e) => {
                warn!(%query, error = %e, "failed to embed query, returning empty result");
                None
            }
        }
    }

    fn set_exact_cache(&self, query: &str, results: Vec<String>) {
        if let Ok(mut cache) = self.exact_cache.lock() {
            cache.put(query.to_string(), results);
        }
    }

    /// Scan the semantic cache newest-first for a vector within the
    /// similarity threshold.
    fn find_semantic_cache_hit(&self, query_vector: &[f32]) -> Option<Vec<String>> {
        let cache = self.semantic_cache.lock().ok()?;
        for (cached_vector, cached_results) in cache.iter().rev() {
            if cosine_similarity(query_vector, cached_vector) >= self.semantic_threshold {
                return Some(cached_results.clone());
            }
        }
        None
    }
}
