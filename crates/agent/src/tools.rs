//! Tool bindings: memory-retriever declarations for the retrieval agent and
//! the device command declaration for the execution agent.
//!
//! Each declaration maps 1:1 to a retriever method. Dispatch goes through a
//! typed operation enum rather than name-keyed reflection, so an undeclared
//! tool cannot slip in at runtime.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use uuid::Uuid;

use valet_device::{CommandRequest, DeviceDriver};
use valet_llm::{ToolDeclaration, ToolExecutor, ToolSet};
use valet_memory::{DistanceMetric, MemoryRetriever, MemoryType};

const DEFAULT_LIMIT: usize = 10;
const DEFAULT_SEMANTIC_LIMIT: usize = 5;
const DEFAULT_NAME_THRESHOLD: f32 = 0.3;

// ── Argument helpers ─────────────────────────────────────────────────────

fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn req_str(args: &Value, key: &str) -> Result<String> {
    opt_str(args, key).with_context(|| format!("missing required argument '{key}'"))
}

fn limit_arg(args: &Value, default: usize) -> usize {
    args.get("limit")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn f32_arg(args: &Value, key: &str, default: f32) -> f32 {
    args.get(key)
        .and_then(|v| v.as_f64())
        .map(|v| v as f32)
        .unwrap_or(default)
}

fn memory_type_arg(args: &Value) -> Result<Option<MemoryType>> {
    match opt_str(args, "memory_type") {
        Some(raw) => Ok(Some(
            MemoryType::from_str(&raw).map_err(anyhow::Error::msg)?,
        )),
        None => Ok(None),
    }
}

// ── Retriever tools ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum RetrieverOp {
    PeopleRelationships,
    LongTermPreferences,
    ShortTermPreferences,
    RecentContent,
    ObservationsAboutEntity,
    SearchMemories,
    TopRelevantMemories,
    FindPersonByName,
    SimilarPersonRelationships,
    SemanticallySimilar,
    EmbeddingForObservation,
    PersonById,
}

struct RetrieverTool {
    retriever: Arc<MemoryRetriever>,
    op: RetrieverOp,
}

#[async_trait::async_trait]
impl ToolExecutor for RetrieverTool {
    async fn invoke(&self, args: Value) -> Result<Value> {
        match self.op {
            RetrieverOp::PeopleRelationships => {
                let rows = self
                    .retriever
                    .get_people_relationships(
                        opt_str(&args, "person_id").as_deref(),
                        limit_arg(&args, DEFAULT_LIMIT),
                    )
                    .await?;
                Ok(serde_json::to_value(rows)?)
            }
            RetrieverOp::LongTermPreferences => {
                let rows = self
                    .retriever
                    .get_long_term_preferences(
                        opt_str(&args, "source_app_id").as_deref(),
                        limit_arg(&args, DEFAULT_LIMIT),
                    )
                    .await?;
                Ok(serde_json::to_value(rows)?)
            }
            RetrieverOp::ShortTermPreferences => {
                let rows = self
                    .retriever
                    .get_short_term_preferences(
                        opt_str(&args, "source_app_id").as_deref(),
                        limit_arg(&args, DEFAULT_LIMIT),
                    )
                    .await?;
                Ok(serde_json::to_value(rows)?)
            }
            RetrieverOp::RecentContent => {
                let rows = self
                    .retriever
                    .get_recent_content(
                        opt_str(&args, "source_id").as_deref(),
                        opt_str(&args, "content_id").as_deref(),
                        limit_arg(&args, DEFAULT_LIMIT),
                    )
                    .await?;
                Ok(serde_json::to_value(rows)?)
            }
            RetrieverOp::ObservationsAboutEntity => {
                let entity_id = req_str(&args, "entity_id")?;
                let rows = self
                    .retriever
                    .get_all_observations_about_entity(
                        &entity_id,
                        opt_str(&args, "entity_type").as_deref(),
                        limit_arg(&args, DEFAULT_LIMIT),
                    )
                    .await?;
                Ok(serde_json::to_value(rows)?)
            }
            RetrieverOp::SearchMemories => {
                let query = req_str(&args, "query")?;
                let ranked = self
                    .retriever
                    .search_memories(&query, memory_type_arg(&args)?, limit_arg(&args, DEFAULT_LIMIT))
                    .await?;
                let entries: Vec<Value> = ranked
                    .into_iter()
                    .map(|(row, rank)| json!({"observation": row, "rank": rank}))
                    .collect();
                Ok(Value::Array(entries))
            }
            RetrieverOp::TopRelevantMemories => {
                let rows = self
                    .retriever
                    .get_top_relevant_memories(memory_type_arg(&args)?, limit_arg(&args, DEFAULT_LIMIT))
                    .await?;
                Ok(serde_json::to_value(rows)?)
            }
            RetrieverOp::FindPersonByName => {
                let name = req_str(&args, "name")?;
                let matches = self
                    .retriever
                    .find_person_by_name(
                        &name,
                        f32_arg(&args, "similarity_threshold", DEFAULT_NAME_THRESHOLD),
                        limit_arg(&args, DEFAULT_LIMIT),
                    )
                    .await?;
                Ok(serde_json::to_value(matches)?)
            }
            RetrieverOp::SimilarPersonRelationships => {
                let query = req_str(&args, "query")?;
                let scored = self
                    .retriever
                    .find_similar_person_relationships(&query, limit_arg(&args, DEFAULT_SEMANTIC_LIMIT))
                    .await?;
                let entries: Vec<Value> = scored
                    .into_iter()
                    .map(|(person, distance)| {
                        json!({
                            "person_id": person.id,
                            "full_name": person.full_name,
                            "platform": person.platform,
                            "platform_handle": person.platform_handle,
                            "relationship_description": person.relationship_description,
                            "distance": distance,
                        })
                    })
                    .collect();
                Ok(Value::Array(entries))
            }
            RetrieverOp::SemanticallySimilar => {
                let query = req_str(&args, "query")?;
                let metric = match opt_str(&args, "distance_metric") {
                    Some(raw) => DistanceMetric::from_str(&raw).map_err(anyhow::Error::msg)?,
                    None => DistanceMetric::Cosine,
                };
                let texts = self
                    .retriever
                    .find_semantically_similar(
                        &query,
                        limit_arg(&args, DEFAULT_SEMANTIC_LIMIT),
                        metric,
                        false,
                    )
                    .await?;
                Ok(serde_json::to_value(texts)?)
            }
            RetrieverOp::EmbeddingForObservation => {
                let raw_id = req_str(&args, "observation_id")?;
                let observation_id =
                    Uuid::parse_str(&raw_id).context("observation_id is not a valid UUID")?;
                match self
                    .retriever
                    .get_embedding_for_observation(observation_id)
                    .await?
                {
                    Some(record) => Ok(json!({
                        "observation_id": record.observation_id,
                        "observation_text": record.observation_text,
                        "created_at": record.created_at,
                        "dimensions": record.embedding_vector.len(),
                    })),
                    None => Ok(Value::Null),
                }
            }
            RetrieverOp::PersonById => {
                let person_id = req_str(&args, "person_id")?;
                match self.retriever.get_person_by_id(&person_id).await? {
                    Some(person) => Ok(json!({
                        "person_id": person.id,
                        "full_name": person.full_name,
                        "platform": person.platform,
                        "platform_handle": person.platform_handle,
                        "relationship_description": person.relationship_description,
                        "last_interacted_at": person.last_interacted_at,
                        "interaction_count": person.interaction_count,
                    })),
                    None => Ok(Value::Null),
                }
            }
        }
    }
}

fn limit_property() -> Value {
    json!({"type": "integer", "description": "Maximum number of results to return."})
}

/// Declarations + executors for every memory retriever method.
pub fn retriever_tool_set(retriever: Arc<MemoryRetriever>) -> ToolSet {
    let mut tools = ToolSet::default();
    let mut register = |name: &str, description: &str, properties: Value, required: Vec<&str>, op| {
        tools.register(
            ToolDeclaration {
                name: name.to_string(),
                description: description.to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }),
            },
            Arc::new(RetrieverTool { retriever: retriever.clone(), op }),
        );
    };

    register(
        "get_people_relationships",
        "Retrieve long-term observations about people the user interacts with (relationships, contacts, communication habits).",
        json!({
            "person_id": {"type": "string", "description": "Unique id of a specific person to narrow to."},
            "limit": limit_property(),
        }),
        vec![],
        RetrieverOp::PeopleRelationships,
    );
    register(
        "get_long_term_preferences",
        "Retrieve long-term preference observations (habitual app and workflow usage patterns).",
        json!({
            "source_app_id": {"type": "string", "description": "App package id to narrow to, e.g. 'com.instagram.android'."},
            "limit": limit_property(),
        }),
        vec![],
        RetrieverOp::LongTermPreferences,
    );
    register(
        "get_short_term_preferences",
        "Retrieve short-term preference observations (recent behavioral signals).",
        json!({
            "source_app_id": {"type": "string", "description": "App package id to narrow to."},
            "limit": limit_property(),
        }),
        vec![],
        RetrieverOp::ShortTermPreferences,
    );
    register(
        "get_recent_content",
        "Retrieve short-term content observations (recently viewed documents and media).",
        json!({
            "source_id": {"type": "string", "description": "Id of the content source to narrow to."},
            "content_id": {"type": "string", "description": "Id of a specific content item."},
            "limit": limit_property(),
        }),
        vec![],
        RetrieverOp::RecentContent,
    );
    register(
        "get_all_observations_about_entity",
        "Find all observations mentioning a specific entity across every memory type.",
        json!({
            "entity_id": {"type": "string", "description": "Unique id of the entity (person, app, content)."},
            "entity_type": {"type": "string", "description": "Entity type filter: 'person', 'app', 'content'."},
            "limit": limit_property(),
        }),
        vec!["entity_id"],
        RetrieverOp::ObservationsAboutEntity,
    );
    register(
        "search_memories",
        "Full-text search across observation content. Returns observations with relevance ranks.",
        json!({
            "query": {"type": "string", "description": "Search terms."},
            "memory_type": {"type": "string", "description": "Optional filter: long_term_people, long_term_preferences, short_term_preferences, or short_term_content."},
            "limit": limit_property(),
        }),
        vec!["query"],
        RetrieverOp::SearchMemories,
    );
    register(
        "get_top_relevant_memories",
        "Retrieve the highest-relevance observations ranked by importance and recurrence.",
        json!({
            "memory_type": {"type": "string", "description": "Optional memory type filter."},
            "limit": limit_property(),
        }),
        vec![],
        RetrieverOp::TopRelevantMemories,
    );
    register(
        "find_person_by_name",
        "Fuzzy name lookup using trigram similarity. Handles typos, nicknames, and partial names. Returns matches ordered by score.",
        json!({
            "name": {"type": "string", "description": "Name to look up, e.g. 'Sarah' or 'Sara Smith'."},
            "similarity_threshold": {"type": "number", "description": "Minimum similarity in [0,1]. Defaults to 0.3."},
            "limit": limit_property(),
        }),
        vec!["name"],
        RetrieverOp::FindPersonByName,
    );
    register(
        "find_similar_person_relationships",
        "Semantic search over relationship descriptions using natural language, e.g. 'friends from the climbing gym'.",
        json!({
            "query": {"type": "string", "description": "Natural-language description of the relationship sought."},
            "limit": limit_property(),
        }),
        vec!["query"],
        RetrieverOp::SimilarPersonRelationships,
    );
    register(
        "find_semantically_similar",
        "Semantic search across all embedded observations using natural language. Returns observation texts ordered by similarity.",
        json!({
            "query": {"type": "string", "description": "Natural-language query."},
            "distance_metric": {"type": "string", "description": "'cosine' (default), 'l2', or 'inner_product'."},
            "limit": limit_property(),
        }),
        vec!["query"],
        RetrieverOp::SemanticallySimilar,
    );
    register(
        "get_embedding_for_observation",
        "Look up the stored embedding metadata for a specific observation by its id.",
        json!({
            "observation_id": {"type": "string", "description": "UUID of the observation."},
        }),
        vec!["observation_id"],
        RetrieverOp::EmbeddingForObservation,
    );
    register(
        "get_person_by_id",
        "Look up a specific person's relationship record by their unique id.",
        json!({
            "person_id": {"type": "string", "description": "Unique person id."},
        }),
        vec!["person_id"],
        RetrieverOp::PersonById,
    );

    tools
}

// ── Device tool ──────────────────────────────────────────────────────────

struct DeviceCommandTool {
    device: Arc<dyn DeviceDriver>,
}

#[async_trait::async_trait]
impl ToolExecutor for DeviceCommandTool {
    async fn invoke(&self, args: Value) -> Result<Value> {
        let Some(command) = opt_str(&args, "enriched_command") else {
            bail!("missing required argument 'enriched_command'");
        };
        let request = CommandRequest {
            command,
            reasoning: args.get("reasoning").and_then(|v| v.as_bool()),
            timeout_secs: args.get("timeout").and_then(|v| v.as_u64()),
        };
        let result = self.device.execute_command(request).await?;
        Ok(serde_json::to_value(result)?)
    }
}

/// The single `execute_command` declaration the execution agent drives.
pub fn device_tool_set(device: Arc<dyn DeviceDriver>) -> ToolSet {
    let mut tools = ToolSet::default();
    tools.register(
        ToolDeclaration {
            name: "execute_command".to_string(),
            description: "Execute a natural language command on the user's Android device. The command should be a clear, enriched instruction describing the action to perform on the phone.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "enriched_command": {
                        "type": "string",
                        "description": "Natural language command to execute on the device. Should be specific and actionable, e.g. 'Open Messages app, send SMS to Kevin Chen (+1-234-567-8900) with message about dinner'.",
                    },
                    "reasoning": {
                        "type": "boolean",
                        "description": "Whether to enable step-by-step reasoning for complex commands. Defaults to false.",
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Maximum time in seconds to wait for command execution. Defaults to 120.",
                    },
                },
                "required": ["enriched_command"],
            }),
        },
        Arc::new(DeviceCommandTool { device }),
    );
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use valet_config::MemoryConfig;
    use valet_llm::{EmbeddingTask, LlmError, TextEmbedder};
    use valet_memory::{
        EmbeddingRecord, InMemoryStructuredStore, InMemoryVectorStore, MemoryStore, Observation,
        PersonRecord, StructuredStore, VectorStore,
    };

    struct UnitEmbedder;

    #[async_trait::async_trait]
    impl TextEmbedder for UnitEmbedder {
        async fn embed(
            &self,
            texts: &[String],
            _task: EmbeddingTask,
        ) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    async fn seeded_retriever() -> Arc<MemoryRetriever> {
        let structured = Arc::new(InMemoryStructuredStore::new());
        let vector = Arc::new(InMemoryVectorStore::new());

        structured
            .insert_observation(
                Observation::short_term_preference(
                    "com.instagram.android",
                    "User checks Instagram DMs with sarah_smith nightly",
                )
                .to_row(),
            )
            .await
            .unwrap();
        vector
            .insert_person(PersonRecord {
                id: "person_sarah".into(),
                first_name: "Sarah".into(),
                last_name: Some("Smith".into()),
                full_name: "Sarah Smith".into(),
                platform: Some("instagram".into()),
                platform_handle: Some("@sarah_smith".into()),
                relationship_description: "Close friend, talks daily over Instagram DMs".into(),
                relationship_vector: vec![1.0, 0.0],
                created_at: Utc::now(),
                updated_at: Utc::now(),
                last_interacted_at: None,
                interaction_count: 12,
            })
            .await
            .unwrap();
        vector
            .insert_embedding(EmbeddingRecord::new(
                uuid::Uuid::new_v4(),
                "User checks Instagram DMs with sarah_smith nightly",
                vec![1.0, 0.0],
            ))
            .await
            .unwrap();

        let store = MemoryStore::new(structured, vector);
        Arc::new(MemoryRetriever::new(
            store,
            Arc::new(UnitEmbedder),
            &MemoryConfig::default(),
        ))
    }

    #[tokio::test]
    async fn tool_set_registers_all_retriever_methods() {
        let tools = retriever_tool_set(seeded_retriever().await);
        let names = tools.names();
        for expected in [
            "get_people_relationships",
            "get_long_term_preferences",
            "get_short_term_preferences",
            "get_recent_content",
            "get_all_observations_about_entity",
            "search_memories",
            "get_top_relevant_memories",
            "find_person_by_name",
            "find_similar_person_relationships",
            "find_semantically_similar",
            "get_embedding_for_observation",
            "get_person_by_id",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(names.len(), 12);
    }

    #[tokio::test]
    async fn short_term_preferences_executor_returns_rows() {
        let tools = retriever_tool_set(seeded_retriever().await);
        let executor = tools.executor("get_short_term_preferences").unwrap();
        let out = executor
            .invoke(json!({"source_app_id": "com.instagram.android"}))
            .await
            .unwrap();
        let rows = out.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0]["node_content"].as_str().unwrap().contains("sarah_smith"));
    }

    #[tokio::test]
    async fn find_person_by_name_executor_handles_typos() {
        let tools = retriever_tool_set(seeded_retriever().await);
        let executor = tools.executor("find_person_by_name").unwrap();
        let out = executor.invoke(json!({"name": "Sara Smith"})).await.unwrap();
        let matches = out.as_array().unwrap();
        assert_eq!(matches[0]["full_name"], "Sarah Smith");
    }

    #[tokio::test]
    async fn search_memories_executor_pairs_rows_with_ranks() {
        let tools = retriever_tool_set(seeded_retriever().await);
        let executor = tools.executor("search_memories").unwrap();
        let out = executor
            .invoke(json!({"query": "instagram dms"}))
            .await
            .unwrap();
        let entries = out.as_array().unwrap();
        assert!(!entries.is_empty());
        assert!(entries[0]["rank"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn search_memories_rejects_bad_memory_type() {
        let tools = retriever_tool_set(seeded_retriever().await);
        let executor = tools.executor("search_memories").unwrap();
        let err = executor
            .invoke(json!({"query": "x", "memory_type": "bogus"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown memory type"));
    }

    #[tokio::test]
    async fn semantically_similar_executor_returns_texts() {
        let tools = retriever_tool_set(seeded_retriever().await);
        let executor = tools.executor("find_semantically_similar").unwrap();
        let out = executor
            .invoke(json!({"query": "who does the user message"}))
            .await
            .unwrap();
        let texts = out.as_array().unwrap();
        assert!(texts[0].as_str().unwrap().contains("sarah_smith"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_an_error() {
        let tools = retriever_tool_set(seeded_retriever().await);
        let executor = tools.executor("find_person_by_name").unwrap();
        let err = executor.invoke(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("missing required argument 'name'"));
    }
}
