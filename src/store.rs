//! The persisted vector index and its lifecycle.
//!
//! A store lives in one directory holding two artifacts:
//!
//! - `index.bin` — the vector matrix. Header: record count (u32 LE) and
//!   dimension (u32 LE), then `count * dimension` f32 LE values in
//!   row-major order. Its presence is the sole signal that an index
//!   exists.
//! - `docstore.redb` — the id/document mapping, one JSON-encoded record
//!   per ordinal.
//!
//! [`VectorStoreManager`] owns the lifecycle: resolve the handle
//! (load-or-absent), deduplicate insertions by stable chunk identity,
//! establish dimensionality from the first batch, and flush both
//! artifacts after every mutation. The docstore transaction commits
//! before `index.bin` is renamed into place, so the existence signal
//! appears last; a record-count mismatch between the artifacts fails
//! the next load.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    chunk_id::ChunkUid,
    config::StoreConfig,
    document::{Document, Metadata, keys},
    embedding::Embedder,
    error::{Error, Result},
};

const DOCSTORE: TableDefinition<u64, &[u8]> = TableDefinition::new("docstore");

const INDEX_FILE: &str = "index.bin";
const DOCSTORE_FILE: &str = "docstore.redb";

/// Header size: 4 bytes record count + 4 bytes dimension.
const HEADER_SIZE: usize = 8;

/// Cosine similarity between two vectors; 0.0 when either has zero
/// magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// One docstore row, JSON-encoded under its ordinal key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    uid: String,
    content: String,
    metadata: Metadata,
}

/// An in-memory vector index: one embedding row plus one document per
/// stored chunk, addressable by ordinal or by chunk uid.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    ids: Vec<String>,
    vectors: Vec<f32>,
    documents: Vec<Document>,
    by_uid: HashMap<String, usize>,
}

impl VectorIndex {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
            documents: Vec::new(),
            by_uid: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The set of stored chunk uids.
    pub fn list_ids(&self) -> BTreeSet<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.by_uid.contains_key(uid)
    }

    pub fn document(&self, ordinal: usize) -> Option<&Document> {
        self.documents.get(ordinal)
    }

    /// The embedding row for an ordinal.
    pub fn vector(&self, ordinal: usize) -> &[f32] {
        let start = ordinal * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// The `k` nearest records by cosine similarity to `query`,
    /// highest-scoring first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|ordinal| (ordinal, cosine_similarity(query, self.vector(ordinal))))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }

    fn push(&mut self, document: Document, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::InvalidInput(format!(
                "embedding dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        let uid = document
            .meta_str(keys::CHUNK_UID)
            .unwrap_or_default()
            .to_string();
        let ordinal = self.ids.len();
        self.by_uid.insert(uid.clone(), ordinal);
        self.ids.push(uid);
        self.vectors.extend_from_slice(&vector);
        self.documents.push(document);
        Ok(())
    }
}

/// Resolution state of the persisted index handle.
///
/// `Absent` (checked disk, nothing persisted yet) is distinct from
/// `Unresolved` (never checked): creation needs a first batch of vectors
/// to establish dimensionality, whereas loading needs no data.
#[derive(Default)]
enum StoreState {
    #[default]
    Unresolved,
    Absent,
    Loaded(VectorIndex),
}

/// Owns a persisted vector index: load-or-create, deduplicated
/// insertion, persistence, and record count.
pub struct VectorStoreManager {
    persist_directory: PathBuf,
    collection_name: String,
    embedder: Arc<dyn Embedder>,
    state: StoreState,
}

impl VectorStoreManager {
    /// Bind a manager to its persist directory. Nothing is read from
    /// disk until the first operation resolves the handle.
    pub fn new(config: &StoreConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            persist_directory: config.persist_directory.clone(),
            collection_name: config.collection_name.clone(),
            embedder,
            state: StoreState::Unresolved,
        }
    }

    pub fn persist_directory(&self) -> &Path {
        &self.persist_directory
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    fn index_path(&self) -> PathBuf {
        self.persist_directory.join(INDEX_FILE)
    }

    fn docstore_path(&self) -> PathBuf {
        self.persist_directory.join(DOCSTORE_FILE)
    }

    /// Resolve the index handle: return the loaded index if one exists
    /// in memory or on disk, `None` if the store has not been created
    /// yet. Ensures the persist directory exists.
    pub fn open_or_none(&mut self) -> Result<Option<&VectorIndex>> {
        self.resolve()?;
        match &self.state {
            StoreState::Loaded(index) => Ok(Some(index)),
            _ => Ok(None),
        }
    }

    fn resolve(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.persist_directory).map_err(|e| {
            Error::storage(
                &self.persist_directory,
                format!("failed to create persist directory: {e}"),
            )
        })?;

        if matches!(self.state, StoreState::Unresolved) {
            if self.index_path().exists() {
                let index = self.load_from_disk()?;
                info!(
                    collection = %self.collection_name,
                    records = index.len(),
                    dimension = index.dimension(),
                    "loaded vector index"
                );
                self.state = StoreState::Loaded(index);
            } else {
                debug!(
                    collection = %self.collection_name,
                    path = %self.persist_directory.display(),
                    "no persisted index found"
                );
                self.state = StoreState::Absent;
            }
        }
        Ok(())
    }

    /// Embed `chunks` and insert them, creating the index if needed.
    ///
    /// With `deduplicate`, chunks whose [`ChunkUid`] is already stored
    /// are dropped; if every chunk is dropped the existing index is
    /// returned unchanged. Every surviving chunk gets its uid attached
    /// under `chunk_uid` metadata. Both artifacts are flushed before
    /// returning.
    pub fn add(&mut self, chunks: Vec<Document>, deduplicate: bool) -> Result<&VectorIndex> {
        if chunks.is_empty() {
            return Err(Error::InvalidInput("no chunks to add".into()));
        }
        self.resolve()?;

        let survivors = self.dedup_and_tag(chunks, None, deduplicate);
        if survivors.is_empty() {
            return self.existing_after_noop();
        }

        let texts: Vec<String> = survivors.iter().map(|(c, _)| c.content.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts)?;
        let batch: Vec<(Document, Vec<f32>)> = survivors
            .into_iter()
            .map(|(chunk, _)| chunk)
            .zip(embeddings)
            .collect();
        self.insert(batch)
    }

    /// Like [`add`](Self::add), but with caller-supplied embeddings,
    /// one per chunk. Deduplication drops the embedding paired with
    /// each dropped chunk.
    pub fn add_with_embeddings(
        &mut self,
        chunks: Vec<Document>,
        embeddings: Vec<Vec<f32>>,
        deduplicate: bool,
    ) -> Result<&VectorIndex> {
        if chunks.is_empty() {
            return Err(Error::InvalidInput("no chunks to add".into()));
        }
        if chunks.len() != embeddings.len() {
            return Err(Error::InvalidInput(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        self.resolve()?;

        let survivors = self.dedup_and_tag(chunks, Some(embeddings), deduplicate);
        if survivors.is_empty() {
            return self.existing_after_noop();
        }

        let batch: Vec<(Document, Vec<f32>)> = survivors
            .into_iter()
            .map(|(chunk, embedding)| (chunk, embedding.unwrap_or_default()))
            .collect();
        self.insert(batch)
    }

    /// Number of stored records; 0 when no index exists.
    pub fn count(&mut self) -> Result<usize> {
        Ok(self.open_or_none()?.map_or(0, VectorIndex::len))
    }

    /// Delete both persisted artifacts and return to the not-yet-created
    /// state. The persist directory itself is kept.
    pub fn reset(&mut self) -> Result<()> {
        warn!(collection = %self.collection_name, "resetting vector store");
        for path in [self.index_path(), self.docstore_path()] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| {
                    Error::storage(&path, format!("failed to remove artifact: {e}"))
                })?;
            }
        }
        self.state = StoreState::Absent;
        Ok(())
    }

    /// Compute uids, drop already-stored chunks (and within-batch
    /// repeats) when deduplicating, and tag survivors with `chunk_uid`.
    fn dedup_and_tag(
        &self,
        chunks: Vec<Document>,
        embeddings: Option<Vec<Vec<f32>>>,
        deduplicate: bool,
    ) -> Vec<(Document, Option<Vec<f32>>)> {
        let total = chunks.len();
        let paired: Vec<(Document, Option<Vec<f32>>)> = match embeddings {
            Some(vectors) => chunks.into_iter().zip(vectors.into_iter().map(Some)).collect(),
            None => chunks.into_iter().map(|c| (c, None)).collect(),
        };

        let mut seen: BTreeSet<ChunkUid> = BTreeSet::new();
        let mut survivors = Vec::with_capacity(paired.len());
        for (mut chunk, embedding) in paired {
            let uid = ChunkUid::for_chunk(&chunk);
            if deduplicate {
                let stored = match &self.state {
                    StoreState::Loaded(index) => index.contains(uid.as_str()),
                    _ => false,
                };
                if stored || !seen.insert(uid.clone()) {
                    continue;
                }
            }
            chunk.set_meta(keys::CHUNK_UID, uid.as_str());
            survivors.push((chunk, embedding));
        }

        if survivors.len() < total {
            info!(
                collection = %self.collection_name,
                dropped = total - survivors.len(),
                kept = survivors.len(),
                "deduplicated chunk batch"
            );
        }
        survivors
    }

    /// The no-op return path when deduplication dropped every chunk.
    fn existing_after_noop(&self) -> Result<&VectorIndex> {
        info!(
            collection = %self.collection_name,
            "all chunks already stored; index unchanged"
        );
        // Dedup can only drop against a loaded index.
        let StoreState::Loaded(index) = &self.state else {
            return Err(Error::InvalidInput(
                "no chunks survived deduplication against an uncreated index".into(),
            ));
        };
        Ok(index)
    }

    /// Append a batch (creating the index from it if none exists) and
    /// flush both artifacts.
    ///
    /// The handle is parked as `Unresolved` while mutating: if anything
    /// fails mid-way the next operation re-resolves from the last
    /// persisted artifacts instead of seeing a half-updated index.
    fn insert(&mut self, batch: Vec<(Document, Vec<f32>)>) -> Result<&VectorIndex> {
        let added = batch.len();
        let mut index = match std::mem::replace(&mut self.state, StoreState::Unresolved) {
            StoreState::Loaded(index) => index,
            _ => {
                let dimension = batch.first().map_or(0, |(_, v)| v.len());
                if dimension == 0 {
                    return Err(Error::Embedding(
                        "first batch produced an empty vector; cannot establish index dimensionality"
                            .into(),
                    ));
                }
                info!(
                    collection = %self.collection_name,
                    dimension,
                    "creating vector index"
                );
                VectorIndex::new(dimension)
            }
        };

        let first_new = index.len();
        for (document, vector) in batch {
            index.push(document, vector)?;
        }

        self.persist(&index, first_new)?;
        info!(
            collection = %self.collection_name,
            added,
            records = index.len(),
            "persisted vector index"
        );

        self.state = StoreState::Loaded(index);
        match &self.state {
            StoreState::Loaded(index) => Ok(index),
            _ => Err(Error::InvalidInput("vector index unavailable".into())),
        }
    }

    /// Flush both artifacts: docstore rows first in one transaction,
    /// then the vector matrix via temp-file rename so `index.bin` (the
    /// existence signal) lands atomically and last.
    fn persist(&self, index: &VectorIndex, first_new: usize) -> Result<()> {
        let docstore_path = self.docstore_path();
        let db = Database::create(&docstore_path)?;
        let txn = db.begin_write()?;
        {
            let mut table = txn.open_table(DOCSTORE)?;

            // A fresh index overwrites any rows left behind by an
            // interrupted earlier run.
            if first_new == 0 {
                let mut stale = Vec::new();
                for entry in table.iter()? {
                    let (key, _) = entry?;
                    stale.push(key.value());
                }
                for key in stale {
                    table.remove(key)?;
                }
            }

            for ordinal in first_new..index.len() {
                let Some(document) = index.document(ordinal) else {
                    continue;
                };
                let record = StoredRecord {
                    uid: index.ids[ordinal].clone(),
                    content: document.content.clone(),
                    metadata: document.metadata.clone(),
                };
                let bytes = serde_json::to_vec(&record).map_err(|e| {
                    Error::storage(&docstore_path, format!("failed to encode record: {e}"))
                })?;
                table.insert(ordinal as u64, bytes.as_slice())?;
            }
        }
        txn.commit()?;

        let index_path = self.index_path();
        let mut buf = Vec::with_capacity(HEADER_SIZE + index.vectors.len() * 4);
        buf.extend_from_slice(&(index.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(index.dimension as u32).to_le_bytes());
        buf.extend_from_slice(bytemuck::cast_slice(&index.vectors));

        let tmp_path = self.persist_directory.join(format!("{INDEX_FILE}.tmp"));
        std::fs::write(&tmp_path, &buf).map_err(|e| {
            Error::storage(&tmp_path, format!("failed to write index artifact: {e}"))
        })?;
        std::fs::rename(&tmp_path, &index_path).map_err(|e| {
            Error::storage(&index_path, format!("failed to publish index artifact: {e}"))
        })?;
        Ok(())
    }

    fn load_from_disk(&self) -> Result<VectorIndex> {
        let index_path = self.index_path();
        let bytes = std::fs::read(&index_path).map_err(|e| {
            Error::storage(&index_path, format!("failed to read index artifact: {e}"))
        })?;
        if bytes.len() < HEADER_SIZE {
            return Err(Error::storage(&index_path, "truncated index artifact"));
        }

        let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap_or_default()) as usize;
        let dimension = u32::from_le_bytes(bytes[4..8].try_into().unwrap_or_default()) as usize;
        let expected = HEADER_SIZE + count * dimension * 4;
        if bytes.len() != expected {
            return Err(Error::storage(
                &index_path,
                format!(
                    "index artifact length {} does not match header ({count} x {dimension})",
                    bytes.len()
                ),
            ));
        }
        let vectors: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes[HEADER_SIZE..]);

        let docstore_path = self.docstore_path();
        let db = Database::create(&docstore_path)?;
        let txn = db.begin_read()?;
        let table = txn.open_table(DOCSTORE)?;

        let mut index = VectorIndex::new(dimension);
        let mut ordinal = 0usize;
        for entry in table.iter()? {
            let (key, value) = entry?;
            let record: StoredRecord =
                serde_json::from_slice(value.value()).map_err(|e| {
                    Error::storage(
                        &docstore_path,
                        format!("corrupt docstore record {}: {e}", key.value()),
                    )
                })?;
            if key.value() != ordinal as u64 || ordinal >= count {
                return Err(Error::storage(
                    &docstore_path,
                    format!("docstore ordinal {} out of step with index", key.value()),
                ));
            }

            let document = Document::with_metadata(record.content, record.metadata);
            index.by_uid.insert(record.uid.clone(), ordinal);
            index.ids.push(record.uid);
            index.documents.push(document);
            ordinal += 1;
        }
        if ordinal != count {
            return Err(Error::storage(
                &docstore_path,
                format!("docstore holds {ordinal} records but index header says {count}"),
            ));
        }
        index.vectors = vectors;

        Ok(index)
    }
}

impl std::fmt::Debug for VectorStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreManager")
            .field("persist_directory", &self.persist_directory)
            .field("collection_name", &self.collection_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved => f.write_str("Unresolved"),
            Self::Absent => f.write_str("Absent"),
            Self::Loaded(index) => write!(f, "Loaded({} records)", index.len()),
        }
    }
}
