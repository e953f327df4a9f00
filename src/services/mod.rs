use std::path::PathBuf;
use std::sync::Arc;

use crate::chunker::Chunker;
use crate::config::AppConfig;
use crate::openai::{Completer, Embedder};
use crate::registry::DocumentRegistry;
use crate::store::VectorStore;
use crate::summarizer::Summarizer;

pub mod ingest;
pub mod qa;

use ingest::IngestService;
use qa::QaService;

// A container for all services to be injected into routes
#[derive(Clone)]
pub struct AppState {
    pub ingest_service: Arc<IngestService>,
    pub qa_service: Arc<QaService>,
    pub registry: Arc<DocumentRegistry>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        store: Arc<VectorStore>,
        registry: Arc<DocumentRegistry>,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        chunker: Arc<Chunker>,
    ) -> Self {
        let summarizer = Summarizer::new(
            completer.clone(),
            chunker.clone(),
            config.pipeline.summary_threshold,
            config.pipeline.chunk_size,
            config.pipeline.strict_upstream,
        );
        let ingest_service = Arc::new(IngestService::new(
            store.clone(),
            registry.clone(),
            embedder.clone(),
            summarizer,
            chunker,
            PathBuf::from(&config.storage.upload_dir),
            config.pipeline.chunk_size,
        ));
        let qa_service = Arc::new(QaService::new(store, registry.clone(), embedder, completer));
        Self {
            ingest_service,
            qa_service,
            registry,
        }
    }
}
