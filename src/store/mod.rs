//! Vector store: two independent index populations (simple/advanced), each
//! paired with an id→text map and an id→document map.
//!
//! Each mode's state sits behind one async mutex, giving single-writer
//! discipline in-process. Every write persists the index and mappings to
//! disk synchronously before returning; each file is written atomically
//! (temp file + rename) but the files are not one transaction, so a failed
//! `add` must be treated as "may have partially succeeded".

pub mod index;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::mode::ProcessingMode;
use index::FlatIndex;

#[derive(Debug, Default)]
struct IndexState {
    /// `None` until the first embedding write fixes the dimension.
    index: Option<FlatIndex>,
    id_to_text: BTreeMap<i64, String>,
    id_to_document: BTreeMap<i64, String>,
}

pub struct VectorStore {
    data_dir: PathBuf,
    simple: Mutex<IndexState>,
    advanced: Mutex<IndexState>,
}

impl VectorStore {
    /// Open the store, loading any persisted state for both modes.
    ///
    /// Unreadable files are logged and treated as absent, matching the
    /// loader's tolerance for partially written legacy data.
    pub fn open(data_dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(data_dir)
            .map_err(|e| AppError::Persistence(format!("create {}: {e}", data_dir.display())))?;
        let mut store = Self {
            data_dir: data_dir.to_path_buf(),
            simple: Mutex::new(IndexState::default()),
            advanced: Mutex::new(IndexState::default()),
        };
        store.simple = Mutex::new(store.load_state(ProcessingMode::Simple));
        store.advanced = Mutex::new(store.load_state(ProcessingMode::Advanced));
        Ok(store)
    }

    fn slot(&self, mode: ProcessingMode) -> &Mutex<IndexState> {
        match mode {
            ProcessingMode::Simple => &self.simple,
            ProcessingMode::Advanced => &self.advanced,
        }
    }

    fn index_path(&self, mode: ProcessingMode) -> PathBuf {
        self.data_dir
            .join(format!("vector_index{}.bin", mode.file_suffix()))
    }

    fn text_map_path(&self, mode: ProcessingMode) -> PathBuf {
        self.data_dir
            .join(format!("id_to_text{}.bin", mode.file_suffix()))
    }

    fn doc_map_path(&self, mode: ProcessingMode) -> PathBuf {
        self.data_dir
            .join(format!("id_to_document_id{}.bin", mode.file_suffix()))
    }

    fn load_state(&self, mode: ProcessingMode) -> IndexState {
        IndexState {
            index: read_bincode(&self.index_path(mode)),
            id_to_text: read_bincode(&self.text_map_path(mode)).unwrap_or_default(),
            id_to_document: read_bincode(&self.doc_map_path(mode)).unwrap_or_default(),
        }
    }

    /// Whether the id→document mapping has ever been persisted for `mode`.
    /// Used by the one-time legacy backfill to decide if it must run.
    pub fn link_file_exists(&self, mode: ProcessingMode) -> bool {
        self.doc_map_path(mode).exists()
    }

    /// Append an embedding, assigning `vector_id = current index size`.
    ///
    /// The index and both mappings are persisted before this returns. On a
    /// persistence failure the in-memory state stays mutated and the error
    /// propagates.
    pub async fn add(
        &self,
        mode: ProcessingMode,
        embedding: &[f32],
        text: &str,
        document_id: Option<&str>,
    ) -> Result<i64, AppError> {
        let mut state = self.slot(mode).lock().await;

        let vector_id = {
            let index = state
                .index
                .get_or_insert_with(|| FlatIndex::new(embedding.len()));
            let id = index.len() as i64;
            index
                .add(id, embedding)
                .map_err(|e| AppError::Persistence(format!("{mode} index: {e}")))?;
            id
        };

        state.id_to_text.insert(vector_id, text.to_string());
        if let Some(doc_id) = document_id {
            state.id_to_document.insert(vector_id, doc_id.to_string());
        }

        self.persist(mode, &state, document_id.is_some())?;
        debug!(
            vector_id,
            %mode,
            document_id = document_id.unwrap_or(""),
            "Embedding added to index"
        );
        Ok(vector_id)
    }

    /// Nearest neighbors over the whole index for `mode`, ascending squared
    /// L2 distance. Empty when the index is uninitialized or empty.
    pub async fn search(
        &self,
        mode: ProcessingMode,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(i64, f32)>, AppError> {
        let state = self.slot(mode).lock().await;
        match &state.index {
            Some(index) if !index.is_empty() => index
                .search(query, k)
                .map_err(|e| AppError::Persistence(format!("{mode} index: {e}"))),
            _ => Ok(Vec::new()),
        }
    }

    /// Vector count for `mode`, reloading from disk first when the in-memory
    /// index is missing or empty. Accommodates multi-process deployments
    /// where another worker wrote the files after this process started.
    pub async fn ensure_loaded(&self, mode: ProcessingMode) -> usize {
        let mut state = self.slot(mode).lock().await;
        let empty = state.index.as_ref().map_or(true, FlatIndex::is_empty);
        if empty {
            let reloaded = self.load_state(mode);
            if reloaded.index.as_ref().is_some_and(|i| !i.is_empty()) {
                info!(%mode, vectors = reloaded.index.as_ref().map_or(0, FlatIndex::len),
                    "Reloaded index from disk");
                *state = reloaded;
            }
        }
        state.index.as_ref().map_or(0, FlatIndex::len)
    }

    pub async fn len(&self, mode: ProcessingMode) -> usize {
        let state = self.slot(mode).lock().await;
        state.index.as_ref().map_or(0, FlatIndex::len)
    }

    /// Chunks linked to `document_id` via the id→document mapping, in
    /// storage (ascending id) order.
    ///
    /// Returns `None` when the mapping is completely empty for this mode so
    /// the caller can fall back to the legacy heuristic.
    pub async fn linked_chunks(
        &self,
        mode: ProcessingMode,
        document_id: &str,
    ) -> Option<Vec<(i64, String)>> {
        let state = self.slot(mode).lock().await;
        if state.id_to_document.is_empty() {
            return None;
        }
        Some(
            state
                .id_to_document
                .iter()
                .filter(|(_, doc)| doc.as_str() == document_id)
                .filter_map(|(&id, _)| state.id_to_text.get(&id).map(|t| (id, t.clone())))
                .collect(),
        )
    }

    /// Full id→text mapping for `mode`; used by the legacy heuristic paths.
    pub async fn id_to_text_snapshot(&self, mode: ProcessingMode) -> BTreeMap<i64, String> {
        self.slot(mode).lock().await.id_to_text.clone()
    }

    /// Merge backfilled document links and persist the mapping file.
    /// Existing links are never overwritten.
    pub async fn assign_links(
        &self,
        mode: ProcessingMode,
        links: BTreeMap<i64, String>,
    ) -> Result<usize, AppError> {
        let mut state = self.slot(mode).lock().await;
        let mut assigned = 0;
        for (id, doc_id) in links {
            state.id_to_document.entry(id).or_insert_with(|| {
                assigned += 1;
                doc_id
            });
        }
        write_bincode(&self.doc_map_path(mode), &state.id_to_document)?;
        Ok(assigned)
    }

    fn persist(
        &self,
        mode: ProcessingMode,
        state: &IndexState,
        with_links: bool,
    ) -> Result<(), AppError> {
        if let Some(index) = &state.index {
            write_bincode(&self.index_path(mode), index)?;
        }
        write_bincode(&self.text_map_path(mode), &state.id_to_text)?;
        if with_links {
            write_bincode(&self.doc_map_path(mode), &state.id_to_document)?;
        }
        Ok(())
    }
}

fn read_bincode<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match fs::read(path) {
        Ok(bytes) => match bincode::deserialize(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable snapshot, ignoring");
                None
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read snapshot, ignoring");
            None
        }
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let bytes = bincode::serialize(value)
        .map_err(|e| AppError::Persistence(format!("serialize {}: {e}", path.display())))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)
        .map_err(|e| AppError::Persistence(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| AppError::Persistence(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn embedding(seed: f32) -> Vec<f32> {
        vec![seed, seed * 2.0, -seed]
    }

    #[tokio::test]
    async fn vector_ids_are_monotonic_from_zero() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        for n in 0..4 {
            let id = store
                .add(ProcessingMode::Advanced, &embedding(n as f32), "chunk", None)
                .await
                .unwrap();
            assert_eq!(id, n);
        }
    }

    #[tokio::test]
    async fn ids_stay_monotonic_after_reload() {
        let dir = TempDir::new().unwrap();
        {
            let store = VectorStore::open(dir.path()).unwrap();
            store
                .add(ProcessingMode::Simple, &embedding(1.0), "first", Some("doc-a"))
                .await
                .unwrap();
        }
        let store = VectorStore::open(dir.path()).unwrap();
        assert_eq!(store.len(ProcessingMode::Simple).await, 1);
        let id = store
            .add(ProcessingMode::Simple, &embedding(2.0), "second", Some("doc-a"))
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn add_then_search_resolves_to_same_text() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        store
            .add(ProcessingMode::Simple, &embedding(5.0), "far away", None)
            .await
            .unwrap();
        let id = store
            .add(ProcessingMode::Simple, &embedding(1.0), "the target", None)
            .await
            .unwrap();

        let hits = store
            .search(ProcessingMode::Simple, &embedding(1.0), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].0, id);
        let texts = store.id_to_text_snapshot(ProcessingMode::Simple).await;
        assert_eq!(texts.get(&hits[0].0).unwrap(), "the target");
    }

    #[tokio::test]
    async fn modes_are_independent_populations() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        let simple_id = store
            .add(ProcessingMode::Simple, &embedding(1.0), "summary", None)
            .await
            .unwrap();
        let advanced_id = store
            .add(ProcessingMode::Advanced, &embedding(1.0), "chunk", None)
            .await
            .unwrap();
        // Ids are local to their index, not globally unique
        assert_eq!(simple_id, 0);
        assert_eq!(advanced_id, 0);
        assert_eq!(store.len(ProcessingMode::Simple).await, 1);
        assert_eq!(store.len(ProcessingMode::Advanced).await, 1);
    }

    #[tokio::test]
    async fn search_on_empty_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        let hits = store
            .search(ProcessingMode::Advanced, &[1.0, 2.0, 3.0], 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn linked_chunks_filters_strictly_by_document() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        store
            .add(ProcessingMode::Advanced, &embedding(1.0), "a1", Some("doc-a"))
            .await
            .unwrap();
        store
            .add(ProcessingMode::Advanced, &embedding(2.0), "b1", Some("doc-b"))
            .await
            .unwrap();
        store
            .add(ProcessingMode::Advanced, &embedding(3.0), "a2", Some("doc-a"))
            .await
            .unwrap();

        let chunks = store
            .linked_chunks(ProcessingMode::Advanced, "doc-a")
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|(_, t)| t.starts_with('a')));
    }

    #[tokio::test]
    async fn linked_chunks_is_none_when_mapping_empty() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        store
            .add(ProcessingMode::Advanced, &embedding(1.0), "legacy chunk", None)
            .await
            .unwrap();
        assert!(store
            .linked_chunks(ProcessingMode::Advanced, "doc-a")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn ensure_loaded_picks_up_writes_from_another_store() {
        let dir = TempDir::new().unwrap();
        let reader = VectorStore::open(dir.path()).unwrap();
        assert_eq!(reader.ensure_loaded(ProcessingMode::Simple).await, 0);

        // A second process writes to the shared files
        let writer = VectorStore::open(dir.path()).unwrap();
        writer
            .add(ProcessingMode::Simple, &embedding(1.0), "summary", Some("doc-a"))
            .await
            .unwrap();

        assert_eq!(reader.ensure_loaded(ProcessingMode::Simple).await, 1);
        let chunks = reader
            .linked_chunks(ProcessingMode::Simple, "doc-a")
            .await
            .unwrap();
        assert_eq!(chunks[0].1, "summary");
    }

    #[tokio::test]
    async fn assign_links_never_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        store
            .add(ProcessingMode::Simple, &embedding(1.0), "text", Some("doc-a"))
            .await
            .unwrap();

        let mut links = BTreeMap::new();
        links.insert(0, "doc-b".to_string());
        links.insert(7, "doc-b".to_string());
        let assigned = store.assign_links(ProcessingMode::Simple, links).await.unwrap();
        assert_eq!(assigned, 1);

        let chunks = store
            .linked_chunks(ProcessingMode::Simple, "doc-a")
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
    }
}
