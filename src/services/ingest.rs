//! Upload pipeline.
//!
//! Validates the filename, persists the raw upload, dedups byte-identical
//! re-uploads per mode, extracts text, then feeds either the summarizer
//! (simple) or the chunker (advanced) into the embedding store, tagging
//! every vector with the document id.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::chunker::Chunker;
use crate::errors::AppError;
use crate::mode::ProcessingMode;
use crate::openai::Embedder;
use crate::registry::{Document, DocumentRegistry};
use crate::store::VectorStore;
use crate::summarizer::Summarizer;

/// Extensions that, combined with a trailing `.pdf`, indicate a disguised
/// executable or script upload (`malware.php.pdf` and friends).
const DANGEROUS_EXTENSIONS: [&str; 12] = [
    ".php", ".js", ".exe", ".sh", ".bat", ".pl", ".py", ".rb", ".jsp", ".asp", ".html", ".htm",
];

/// Accept only names made of letters, digits, dash, underscore, dot, space,
/// with a `.pdf` extension and no dangerous double extension. Content is
/// irrelevant: the name alone decides.
pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    if filename.is_empty() {
        return Err(AppError::Validation("No selected file".to_string()));
    }
    let lower = filename.to_lowercase();
    if !lower.ends_with(".pdf") {
        return Err(AppError::UnsupportedType);
    }
    if filename.contains(['<', '>', '"', '\'']) {
        return Err(AppError::UnsafeFilename(filename.to_string()));
    }
    if !filename
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
    {
        return Err(AppError::UnsafeFilename(filename.to_string()));
    }
    if DANGEROUS_EXTENSIONS
        .iter()
        .any(|ext| lower.contains(&format!("{ext}.pdf")))
    {
        return Err(AppError::UnsafeFilename(filename.to_string()));
    }
    Ok(())
}

/// Reduce a validated name to a safe storage name: spaces become
/// underscores, anything outside the safe set is dropped.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
            _ => None,
        })
        .collect()
}

#[derive(Debug, PartialEq)]
pub enum IngestStatus {
    /// Number of vectors written for this document.
    Processed(usize),
    AlreadyProcessed,
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub document_id: String,
    pub status: IngestStatus,
}

pub struct IngestService {
    store: Arc<VectorStore>,
    registry: Arc<DocumentRegistry>,
    embedder: Arc<dyn Embedder>,
    summarizer: Summarizer,
    chunker: Arc<Chunker>,
    upload_dir: PathBuf,
    chunk_size: usize,
    /// Content hashes already processed this run, per mode. Deliberately
    /// process-lifetime only: a restart forgets the set and a duplicate
    /// upload is reprocessed.
    processed: Mutex<HashSet<(ProcessingMode, String)>>,
}

impl IngestService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<VectorStore>,
        registry: Arc<DocumentRegistry>,
        embedder: Arc<dyn Embedder>,
        summarizer: Summarizer,
        chunker: Arc<Chunker>,
        upload_dir: PathBuf,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            registry,
            embedder,
            summarizer,
            chunker,
            upload_dir,
            chunk_size,
            processed: Mutex::new(HashSet::new()),
        }
    }

    pub async fn ingest(
        &self,
        mode: ProcessingMode,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IngestOutcome, AppError> {
        let start = Instant::now();
        validate_filename(filename)?;
        let stored_name = sanitize_filename(filename);

        fs::create_dir_all(&self.upload_dir)
            .map_err(|e| AppError::Persistence(format!("create upload dir: {e}")))?;
        let path = self.upload_dir.join(&stored_name);
        fs::write(&path, bytes)
            .map_err(|e| AppError::Persistence(format!("save upload {}: {e}", path.display())))?;

        let content_hash = hex::encode(Sha256::digest(bytes));
        let extracted = crate::pdf::extract(bytes, &stored_name)?;

        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let document = Document::new(&extracted.title, mode, &date, &stored_name);
        let document_id = document.id.clone();
        self.registry.register(document).await?;

        if self
            .processed
            .lock()
            .await
            .contains(&(mode, content_hash.clone()))
        {
            info!(%mode, filename = %stored_name, "File already processed, skipping");
            return Ok(IngestOutcome {
                document_id,
                status: IngestStatus::AlreadyProcessed,
            });
        }

        let vectors = match mode {
            ProcessingMode::Simple => {
                let summary = self.summarizer.summarize(&extracted.text).await?;
                if summary.trim().is_empty() {
                    return Err(AppError::ExtractionFailed(
                        "could not produce a summary for this document".to_string(),
                    ));
                }
                let embedding = self.embedder.embed(&summary).await?;
                self.store
                    .add(mode, &embedding, &summary, Some(&document_id))
                    .await?;
                1
            }
            ProcessingMode::Advanced => {
                let chunks = self.chunker.split(&extracted.text, self.chunk_size);
                if chunks.is_empty() {
                    // Silent-failure mode: the upload succeeds while
                    // contributing nothing to the index.
                    warn!(document_id = %document_id, "Zero chunks produced for advanced upload");
                }
                for chunk in &chunks {
                    let embedding = self.embedder.embed(chunk).await?;
                    self.store
                        .add(mode, &embedding, chunk, Some(&document_id))
                        .await?;
                }
                chunks.len()
            }
        };

        self.processed.lock().await.insert((mode, content_hash));

        metrics::counter!("docqa_uploads_total", "mode" => mode.as_str()).increment(1);
        metrics::counter!("docqa_vectors_indexed_total", "mode" => mode.as_str())
            .increment(vectors as u64);
        metrics::histogram!("docqa_ingest_duration_seconds").record(start.elapsed().as_secs_f64());

        info!(
            document_id = %document_id,
            %mode,
            vectors,
            elapsed_ms = start.elapsed().as_millis(),
            "Document ingested"
        );
        Ok(IngestOutcome {
            document_id,
            status: IngestStatus::Processed(vectors),
        })
    }
}
