//! ragstore - a local document retrieval pipeline for RAG applications.
//!
//! ragstore ingests plain-text documents, splits them into overlapping
//! chunks, embeds the chunks, and stores them in a disk-persisted
//! vector index with idempotent ingestion: re-running over unchanged
//! input adds no duplicate records. Retrieval supports plain
//! similarity, diversity-aware MMR, and score-threshold search, with an
//! optional pass/drop relevance filter on top.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ragstore::{Chunker, Config, DocumentLoader, HashEmbedder, Retriever, VectorStoreManager};
//!
//! let config = Config::default();
//! let embedder = Arc::new(HashEmbedder::new(config.embedding.dimension));
//! let mut store = VectorStoreManager::new(&config.store, embedder);
//!
//! // Write path: load -> chunk -> embed -> store.
//! let loader = DocumentLoader::new();
//! let docs = loader.load_dir(std::path::Path::new("./notes")).unwrap();
//! let chunks = Chunker::new(&config.chunking).chunk_documents(&docs);
//! store.add(chunks, true).unwrap();
//!
//! // Read path: embed the query and rank stored chunks.
//! let retriever = Retriever::from_config(&config.retriever);
//! for result in retriever.retrieve(&mut store, "ownership rules").unwrap() {
//!     println!("[{:.3}] {}", result.score, result.chunk.content);
//! }
//! ```

pub mod chunk_id;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod ingestion;
pub mod retrieval;
pub mod store;

pub use chunk_id::ChunkUid;
pub use chunking::Chunker;
pub use config::Config;
pub use document::{Document, Metadata};
pub use embedding::{Embedder, HashEmbedder};
pub use error::{Error, Result};
pub use ingestion::DocumentLoader;
pub use retrieval::{RelevanceFilter, Retriever, ScoredChunk, SearchStrategy};
pub use store::{VectorIndex, VectorStoreManager};
