//! Single-document PDF question answering service.
//!
//! Uploads are processed into per-mode vector indexes by one of two
//! pipelines: "simple" embeds a single generated summary, while "advanced"
//! embeds every token chunk of the full text. Questions are embedded,
//! matched against the chosen index, filtered to the selected document,
//! and answered from a grounding prompt built over the retrieved chunks.

pub mod chunker;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod mode;
pub mod openai;
pub mod pdf;
pub mod registry;
pub mod routes;
pub mod services;
pub mod store;
pub mod summarizer;

use std::path::Path;
use std::sync::Arc;

use crate::chunker::Chunker;
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::registry::DocumentRegistry;
use crate::services::AppState;
use crate::store::VectorStore;

/// Build the full application router from configuration: open the store,
/// bootstrap the registry (placeholder metadata + legacy link backfill),
/// wire the language-model backends and assemble the routes.
pub async fn build_app(config: &AppConfig) -> Result<axum::Router, AppError> {
    let store = Arc::new(VectorStore::open(Path::new(&config.storage.data_dir))?);
    let registry = Arc::new(DocumentRegistry::open(Path::new(&config.storage.data_dir)));
    registry.bootstrap(&store).await?;

    let (embedder, completer) = openai::build_backends(&config.openai)?;
    let chunker = Arc::new(Chunker::new()?);

    let state = AppState::new(config, store, registry, embedder, completer, chunker);
    let metrics_handle = metrics::install();
    Ok(routes::create_router(state, metrics_handle))
}
