use crate::document::{Document, keys};

/// Length of the content fingerprint in hex characters.
const FINGERPRINT_LEN: usize = 12;

/// A stable chunk identifier derived from (source, page, chunk position,
/// content fingerprint).
///
/// Two ingestion runs over byte-identical input produce identical uids;
/// any change to a chunk's text, position, or source changes the uid.
/// This is the primary key for deduplication in the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkUid(String);

impl ChunkUid {
    /// Derive a uid from its identity components.
    ///
    /// The fingerprint is the first 12 hex characters of the blake3 hash
    /// of the exact chunk text.
    pub fn derive(source: &str, page: u64, chunk_index: u64, content: &str) -> Self {
        let digest = blake3::hash(content.as_bytes()).to_hex();
        let fingerprint = &digest.as_str()[..FINGERPRINT_LEN];
        Self(format!("{source}:{page}:{chunk_index}:{fingerprint}"))
    }

    /// Derive a uid from a chunk's metadata and content.
    ///
    /// Falls back through `file_name` then `source` for the origin
    /// component and `page` then `page_number` for pagination; absent
    /// values default to `"unknown"` and `0` respectively.
    pub fn for_chunk(chunk: &Document) -> Self {
        let source = chunk
            .meta_str(keys::FILE_NAME)
            .or_else(|| chunk.meta_str(keys::SOURCE))
            .unwrap_or("unknown");
        let page = chunk
            .meta_u64(keys::PAGE)
            .or_else(|| chunk.meta_u64(keys::PAGE_NUMBER))
            .unwrap_or(0);
        let chunk_index = chunk.meta_u64(keys::CHUNK_ID).unwrap_or(0);
        Self::derive(source, page, chunk_index, &chunk.content)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ChunkUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
