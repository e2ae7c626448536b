//! HTTP surface: shared app state, router assembly, and route handlers.

mod routes;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use valet_config::AppConfig;
use valet_device::{DeviceDriver, HttpDeviceDriver};
use valet_llm::{ChatModel, HttpChatModel, HttpTextEmbedder, LlmClient, TextEmbedder};
use valet_memory::{
    InMemoryStructuredStore, InMemoryVectorStore, MemoryRetriever, MemoryStore,
};
use valet_tracker::{EmbeddingGenerator, ObservationInferencer, ObservationTracker};

/// Process-wide shared state. Clients are shared by `Arc`; agents and
/// orchestrators are built request-scoped from these handles.
pub struct AppState {
    pub config: AppConfig,
    pub llm: LlmClient,
    pub embedder: Arc<dyn TextEmbedder>,
    pub device: Arc<dyn DeviceDriver>,
    pub store: MemoryStore,
    pub retriever: Arc<MemoryRetriever>,
    pub tracker: Arc<ObservationTracker>,
}

impl AppState {
    /// Wire the full component graph from pluggable transports. Production
    /// uses the HTTP implementations via [`bootstrap`]; tests substitute
    /// scripted fakes.
    pub fn assemble(
        config: AppConfig,
        model: Arc<dyn ChatModel>,
        embedder: Arc<dyn TextEmbedder>,
        device: Arc<dyn DeviceDriver>,
    ) -> Arc<Self> {
        let llm = LlmClient::new(model, &config.llm);

        let structured = Arc::new(InMemoryStructuredStore::new());
        let vector = Arc::new(InMemoryVectorStore::new());
        let store = MemoryStore::new(structured.clone(), vector.clone());

        let retriever = Arc::new(MemoryRetriever::new(
            store.clone(),
            embedder.clone(),
            &config.memory,
        ));

        let tracker = Arc::new(ObservationTracker::new(
            device.clone(),
            ObservationInferencer::new(llm.clone()),
            EmbeddingGenerator::new(embedder.clone(), vector),
            structured,
            &config.memory,
            &config.tracker,
        ));

        Arc::new(Self { config, llm, embedder, device, store, retriever, tracker })
    }
}

/// Build app state with the production HTTP transports.
pub fn bootstrap(config: AppConfig) -> Arc<AppState> {
    let model = Arc::new(HttpChatModel::new(&config.llm));
    let embedder = Arc::new(HttpTextEmbedder::new(&config.embedding));
    let device = Arc::new(HttpDeviceDriver::new(&config.device));
    AppState::assemble(config, model, embedder, device)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health::health))
        .nest(
            "/monitoring/background-tasks",
            routes::monitoring::router(),
        )
        .nest("/execution-test", routes::execution_test::router())
        .nest("/retrieval-test", routes::retrieval_test::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
