//! Configuration for the ingestion and retrieval pipeline.
//!
//! Settings live in a JSON file with one section per component; every
//! field has a default, so a missing file (when no explicit path was
//! given) or a partial file both work.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "RAGSTORE_CONFIG";

/// Default config file name, resolved relative to the working directory.
const DEFAULT_CONFIG_FILE: &str = "ragstore.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retriever: RetrieverConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Output dimensionality of the built-in hashing embedder.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding the persisted index artifacts.
    #[serde(default = "default_persist_directory")]
    pub persist_directory: PathBuf,
    /// Logical collection name, used in log lines and status output.
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

/// Which search strategy the retriever runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Similarity,
    Mmr,
    SimilarityScoreThreshold,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub search_type: SearchType,
    /// Number of results to return.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidate pool size for MMR.
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    /// MMR balance: 1.0 = pure relevance, 0.0 = pure diversity.
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,
    /// Minimum cosine similarity (in [-1, 1]) for threshold search.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    120
}

fn default_dimension() -> usize {
    256
}

fn default_persist_directory() -> PathBuf {
    PathBuf::from("./ragstore_data")
}

fn default_collection_name() -> String {
    "research_notes".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_fetch_k() -> usize {
    20
}

fn default_lambda_mult() -> f32 {
    0.7
}

fn default_score_threshold() -> f32 {
    0.7
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persist_directory: default_persist_directory(),
            collection_name: default_collection_name(),
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            search_type: SearchType::default(),
            top_k: default_top_k(),
            fetch_k: default_fetch_k(),
            lambda_mult: default_lambda_mult(),
            score_threshold: default_score_threshold(),
        }
    }
}

impl Config {
    /// Load configuration, resolving the file path in priority order:
    /// an explicit path, the `RAGSTORE_CONFIG` environment variable,
    /// then `ragstore.json` in the working directory.
    ///
    /// An explicit or env-supplied path that does not exist is a
    /// [`Error::Config`]; a missing default file just yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);

        let (path, required) = if let Some(p) = explicit {
            (p.to_path_buf(), true)
        } else if let Some(p) = env_path {
            (p, true)
        } else {
            (PathBuf::from(DEFAULT_CONFIG_FILE), false)
        };

        if !path.exists() {
            if required {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        Self::from_file(&path)
    }

    /// Parse a config file, mapping read and parse failures to
    /// [`Error::Config`] with the offending path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            Error::Config(format!("failed to parse {}: {e}", path.display()))
        })?;

        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 120);
        assert_eq!(config.embedding.dimension, 256);
        assert_eq!(config.store.collection_name, "research_notes");
        assert_eq!(config.retriever.top_k, 5);
        assert_eq!(config.retriever.fetch_k, 20);
        assert_eq!(config.retriever.search_type, SearchType::Similarity);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ragstore.json");
        std::fs::write(
            &path,
            r#"{ "chunking": { "chunk_size": 400 }, "retriever": { "search_type": "mmr" } }"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.chunking.chunk_overlap, 120);
        assert_eq!(config.retriever.search_type, SearchType::Mmr);
        assert_eq!(config.retriever.lambda_mult, 0.7);
    }

    #[test]
    fn explicit_missing_path_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.json");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_section_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("extra.json");
        std::fs::write(&path, r#"{ "chroma": {} }"#).unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
