//! Document metadata registry.
//!
//! Owns `processed_documents.json` (full rewrite on every change) and the
//! one-time startup migration that links legacy vectors to documents by
//! substring heuristic. Steady-state linkage is written by the store at add
//! time; the heuristic here exists only for data created before links were
//! recorded.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::mode::ProcessingMode;
use crate::store::VectorStore;

pub const METADATA_FILE: &str = "processed_documents.json";

/// Placeholder values used when metadata is reconstructed from bare vector
/// mappings (pre-metadata legacy data).
const UNKNOWN: &str = "unknown";
const PLACEHOLDER_TITLE_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub date: String,
    pub processing: ProcessingMode,
    pub filename: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Document {
    /// The id is deterministic: two uploads sharing title, mode and date
    /// collide and the later registration overwrites the earlier metadata.
    pub fn new(title: &str, processing: ProcessingMode, date: &str, filename: &str) -> Self {
        Self {
            id: format!("{title}-{processing}-{date}"),
            title: title.to_string(),
            date: date.to_string(),
            processing,
            filename: filename.to_string(),
            display_name: None,
        }
    }

    /// First hyphen-delimited segment of the id, used as a weaker match key
    /// by the legacy linkage heuristic.
    fn title_prefix(&self) -> &str {
        self.id.split('-').next().unwrap_or("")
    }

    fn filename_stem(&self) -> &str {
        if self.filename.is_empty() || self.filename == UNKNOWN {
            return "";
        }
        self.filename
            .rsplit_once('.')
            .map_or(self.filename.as_str(), |(stem, _)| stem)
    }
}

/// Chunk ids whose text contains the document's title, else its id prefix,
/// else its filename stem (in that priority). A fuzzy join with no
/// uniqueness guarantee; only for data predating explicit links.
pub fn heuristic_chunk_matches(
    doc: &Document,
    chunks: &BTreeMap<i64, String>,
) -> Vec<(i64, String)> {
    let title = doc.title.as_str();
    let prefix = doc.title_prefix();
    let stem = doc.filename_stem();
    chunks
        .iter()
        .filter(|(_, text)| !text.is_empty())
        .filter(|(_, text)| {
            (!title.is_empty() && text.contains(title))
                || (!prefix.is_empty() && text.contains(prefix))
                || (!stem.is_empty() && text.contains(stem))
        })
        .map(|(&id, text)| (id, text.clone()))
        .collect()
}

pub struct DocumentRegistry {
    path: PathBuf,
    docs: RwLock<HashMap<String, Document>>,
    had_metadata_file: bool,
}

impl DocumentRegistry {
    /// Open the registry, loading `processed_documents.json` when present.
    /// A corrupt file is logged and treated as empty.
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(METADATA_FILE);
        let had_metadata_file = path.exists();
        let docs = if had_metadata_file {
            read_documents(&path).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Self {
            path,
            docs: RwLock::new(docs),
            had_metadata_file,
        }
    }

    /// Startup routine: reconstruct placeholder metadata when the metadata
    /// file is missing but vectors exist, then run the one-time link
    /// backfill for modes whose link file has never been written.
    pub async fn bootstrap(&self, store: &VectorStore) -> Result<(), AppError> {
        if !self.had_metadata_file {
            self.reconstruct_placeholders(store).await;
        }
        self.backfill_document_links(store).await?;
        Ok(())
    }

    /// Rebuild minimal in-memory metadata from bare id→text mappings: the
    /// first 40 characters of each stored text stand in for a title.
    async fn reconstruct_placeholders(&self, store: &VectorStore) {
        let mut docs = self.docs.write().await;
        for mode in ProcessingMode::ALL {
            for text in store.id_to_text_snapshot(mode).await.values() {
                let title: String = if text.is_empty() {
                    UNKNOWN.to_string()
                } else {
                    text.chars().take(PLACEHOLDER_TITLE_LEN).collect()
                };
                let doc = Document::new(&title, mode, UNKNOWN, UNKNOWN);
                docs.insert(doc.id.clone(), doc);
            }
        }
        if !docs.is_empty() {
            info!(documents = docs.len(), "Reconstructed placeholder metadata from vector mappings");
        }
    }

    /// One-time migration: for each mode whose id→document file is absent
    /// while vectors exist, link every chunk to the first document whose
    /// title/id-prefix/filename-stem it contains, then persist the mapping.
    pub async fn backfill_document_links(&self, store: &VectorStore) -> Result<(), AppError> {
        for mode in ProcessingMode::ALL {
            if store.link_file_exists(mode) {
                continue;
            }
            let chunks = store.id_to_text_snapshot(mode).await;
            if chunks.is_empty() {
                continue;
            }
            let docs = self.docs.read().await;
            let mut docs_for_mode: Vec<&Document> =
                docs.values().filter(|d| d.processing == mode).collect();
            if docs_for_mode.is_empty() {
                continue;
            }
            docs_for_mode.sort_by(|a, b| a.id.cmp(&b.id));

            let mut links: BTreeMap<i64, String> = BTreeMap::new();
            for doc in docs_for_mode {
                for (id, _) in heuristic_chunk_matches(doc, &chunks) {
                    // First matching document wins
                    links.entry(id).or_insert_with(|| doc.id.clone());
                }
            }
            drop(docs);
            let assigned = store.assign_links(mode, links).await?;
            info!(%mode, assigned, "Backfilled document links for legacy vectors");
        }
        Ok(())
    }

    /// Insert or overwrite by `document.id` and rewrite the metadata file.
    pub async fn register(&self, document: Document) -> Result<(), AppError> {
        let mut docs = self.docs.write().await;
        if let Some(previous) = docs.insert(document.id.clone(), document.clone()) {
            warn!(
                document_id = %document.id,
                previous_filename = %previous.filename,
                "Document id collision: metadata overwritten"
            );
        }
        self.save(&docs)
    }

    pub async fn get(&self, document_id: &str) -> Option<Document> {
        self.docs.read().await.get(document_id).cloned()
    }

    /// Set or clear the display name. Fails with `NotFound` for unknown ids.
    pub async fn update_display_name(
        &self,
        document_id: &str,
        display_name: Option<String>,
    ) -> Result<Document, AppError> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(document_id)
            .ok_or_else(|| AppError::NotFound(document_id.to_string()))?;
        doc.display_name = display_name;
        let updated = doc.clone();
        self.save(&docs)?;
        Ok(updated)
    }

    /// All documents, reloading from disk first so concurrent worker
    /// processes observe each other's writes.
    pub async fn list(&self) -> Vec<Document> {
        let mut docs = self.docs.write().await;
        if let Some(fresh) = read_documents(&self.path) {
            *docs = fresh;
        }
        let mut out: Vec<Document> = docs.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    fn save(&self, docs: &HashMap<String, Document>) -> Result<(), AppError> {
        let json = serde_json::to_string(docs)
            .map_err(|e| AppError::Persistence(format!("serialize metadata: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| AppError::Persistence(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| AppError::Persistence(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

fn read_documents(path: &Path) -> Option<HashMap<String, Document>> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(docs) => Some(docs),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable metadata file, ignoring");
                None
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read metadata file, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(title: &str, mode: ProcessingMode) -> Document {
        Document::new(title, mode, "2026-08-28", &format!("{title}.pdf"))
    }

    #[tokio::test]
    async fn register_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let registry = DocumentRegistry::open(dir.path());
        let d = doc("Neural Networks", ProcessingMode::Simple);
        registry.register(d.clone()).await.unwrap();
        assert_eq!(registry.get(&d.id).await, Some(d));
    }

    #[tokio::test]
    async fn list_reloads_from_disk() {
        let dir = TempDir::new().unwrap();
        let writer = DocumentRegistry::open(dir.path());
        let reader = DocumentRegistry::open(dir.path());

        writer
            .register(doc("Graph Theory", ProcessingMode::Advanced))
            .await
            .unwrap();
        let listed = reader.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Graph Theory");
    }

    #[tokio::test]
    async fn update_display_name_round_trips_and_404s() {
        let dir = TempDir::new().unwrap();
        let registry = DocumentRegistry::open(dir.path());
        let d = doc("Compilers", ProcessingMode::Simple);
        registry.register(d.clone()).await.unwrap();

        let updated = registry
            .update_display_name(&d.id, Some("My compilers paper".into()))
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("My compilers paper"));

        let cleared = registry.update_display_name(&d.id, None).await.unwrap();
        assert_eq!(cleared.display_name, None);

        let err = registry
            .update_display_name("missing-id", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn same_id_overwrites_metadata() {
        let dir = TempDir::new().unwrap();
        let registry = DocumentRegistry::open(dir.path());
        let mut first = doc("Same Title", ProcessingMode::Simple);
        first.filename = "one.pdf".into();
        let mut second = doc("Same Title", ProcessingMode::Simple);
        second.filename = "two.pdf".into();

        registry.register(first).await.unwrap();
        registry.register(second).await.unwrap();
        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filename, "two.pdf");
    }

    #[test]
    fn heuristic_matches_by_title_then_prefix_then_stem() {
        let d = Document::new("Quantum-Computing", ProcessingMode::Simple, "2026-01-01", "qc-notes.pdf");
        let mut chunks = BTreeMap::new();
        chunks.insert(0, "An intro to Quantum-Computing for everyone".to_string());
        chunks.insert(1, "Quantum speedups are discussed here".to_string());
        chunks.insert(2, "These are my qc-notes from class".to_string());
        chunks.insert(3, "Completely unrelated text".to_string());
        chunks.insert(4, String::new());

        let matched: Vec<i64> = heuristic_chunk_matches(&d, &chunks)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(matched, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn backfill_links_legacy_vectors_by_title() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        // Legacy vectors: text recorded without document links
        store
            .add(ProcessingMode::Advanced, &[1.0, 0.0], "Chapter on Distributed Systems", None)
            .await
            .unwrap();
        store
            .add(ProcessingMode::Advanced, &[0.0, 1.0], "Nothing relevant here", None)
            .await
            .unwrap();

        let registry = DocumentRegistry::open(dir.path());
        let d = doc("Distributed Systems", ProcessingMode::Advanced);
        registry.register(d.clone()).await.unwrap();

        registry.backfill_document_links(&store).await.unwrap();
        let chunks = store
            .linked_chunks(ProcessingMode::Advanced, &d.id)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, 0);
    }

    #[tokio::test]
    async fn backfill_skips_modes_with_existing_link_file() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        // A linked add writes the mapping file, so backfill must not run
        store
            .add(ProcessingMode::Simple, &[1.0], "Summary of X", Some("other-doc"))
            .await
            .unwrap();

        let registry = DocumentRegistry::open(dir.path());
        registry
            .register(doc("Summary of X", ProcessingMode::Simple))
            .await
            .unwrap();
        registry.backfill_document_links(&store).await.unwrap();

        let chunks = store
            .linked_chunks(ProcessingMode::Simple, "other-doc")
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_reconstructs_placeholder_metadata() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        let text = "A fairly long stored summary text that exceeds forty characters";
        store
            .add(ProcessingMode::Simple, &[1.0], text, None)
            .await
            .unwrap();

        let registry = DocumentRegistry::open(dir.path());
        registry.bootstrap(&store).await.unwrap();

        let docs = registry.docs.read().await;
        assert_eq!(docs.len(), 1);
        let d = docs.values().next().unwrap();
        assert_eq!(d.title.chars().count(), 40);
        assert_eq!(d.date, "unknown");
        assert_eq!(d.filename, "unknown");
        assert!(text.starts_with(&d.title));
    }
}
