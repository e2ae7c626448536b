mod backend;
mod model;
mod retriever;
mod store;
mod text;

pub use backend::{InMemoryStructuredStore, InMemoryVectorStore};
pub use model::{
    DistanceMetric, EmbeddingRecord, MemoryType, Observation, ObservationRow, PersonNameMatch,
    PersonRecord,
};
pub use retriever::MemoryRetriever;
pub use store::{MemoryStore, StoreError, StructuredStore, VectorStore};
pub use text::{cosine_similarity, trigram_similarity};
