//! Shared application state for the web server.

use async_trait::async_trait;
use papergraph_config::Config;
use papergraph_db::{ContentStore, MemoryStore};
use papergraph_ingestion::{build_converter, JobEvent, JobStore, Orchestrator};
use papergraph_llm::{select_backend, select_embedder, LlmBackend, LlmError, LlmRequest, LlmResponse};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Orchestrator,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config, orchestrator: Orchestrator) -> Self {
        Self { config: Arc::new(config), orchestrator }
    }

    /// Wire the store, model backends and converter named by `config`.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder = select_embedder(&config.embedding, &config.keys);
        let store: Arc<dyn ContentStore> = match &config.server.store_path {
            Some(path) => Arc::new(MemoryStore::open(path, embedder).await?),
            None => Arc::new(MemoryStore::new().with_embedder(embedder)),
        };
        let backend = match select_backend(&config.llm, &config.keys) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(error = %e, "No LLM backend available, extraction jobs will fail");
                Arc::new(OfflineBackend(e.to_string()))
            }
        };
        let converter = build_converter(&config.ingestion, &config.keys);
        let orchestrator = Orchestrator::new(&config, JobStore::new(), backend, store, converter);
        Ok(Self::new(config, orchestrator))
    }

    pub fn jobs(&self) -> &JobStore {
        self.orchestrator.jobs()
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        self.orchestrator.store()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.jobs().subscribe()
    }
}

/// Stand-in used when no API key is configured, so the server still starts.
struct OfflineBackend(String);

#[async_trait]
impl LlmBackend for OfflineBackend {
    async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::Unavailable(self.0.clone()))
    }

    fn model_id(&self) -> &str { "offline" }
}
