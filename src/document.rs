use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata attached to a document or chunk: string keys mapping to
/// scalar JSON values (strings, numbers, booleans).
pub type Metadata = BTreeMap<String, Value>;

/// Well-known metadata keys used throughout the pipeline.
pub mod keys {
    /// Origin path or identifier of the parent record.
    pub const SOURCE: &str = "source";
    /// Base name of the originating file.
    pub const FILE_NAME: &str = "file_name";
    /// File extension of the originating file (e.g. `.md`).
    pub const FILE_TYPE: &str = "file_type";
    /// Page number for paginated sources.
    pub const PAGE: &str = "page";
    /// Alternate page key some loaders emit.
    pub const PAGE_NUMBER: &str = "page_number";
    /// Zero-based chunk position within the parent record.
    pub const CHUNK_ID: &str = "chunk_id";
    /// Number of chunks produced from the parent record.
    pub const TOTAL_CHUNKS: &str = "total_chunks";
    /// Stable chunk identity, attached at ingestion time.
    pub const CHUNK_UID: &str = "chunk_uid";
}

/// A unit of text with attached metadata.
///
/// Used both for raw records produced by the loader and for the chunks
/// the [`Chunker`](crate::chunking::Chunker) derives from them; chunks
/// carry the parent record's metadata plus positional keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Fetch a metadata value as a string, if present and string-valued.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Fetch a metadata value as an unsigned integer, if present.
    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }

    /// Insert a metadata entry, replacing any existing value.
    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_accessors() {
        let mut doc = Document::new("hello");
        doc.set_meta(keys::SOURCE, "notes/a.md");
        doc.set_meta(keys::CHUNK_ID, 3u64);

        assert_eq!(doc.meta_str(keys::SOURCE), Some("notes/a.md"));
        assert_eq!(doc.meta_u64(keys::CHUNK_ID), Some(3));
        assert_eq!(doc.meta_str(keys::CHUNK_ID), None);
        assert_eq!(doc.meta_u64(keys::PAGE), None);
    }

    #[test]
    fn set_meta_replaces() {
        let mut doc = Document::new("hello");
        doc.set_meta(keys::PAGE, 1u64);
        doc.set_meta(keys::PAGE, 2u64);
        assert_eq!(doc.meta_u64(keys::PAGE), Some(2));
    }

    #[test]
    fn serde_roundtrip() {
        let mut doc = Document::new("body text");
        doc.set_meta(keys::FILE_NAME, "a.md");

        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }
}
