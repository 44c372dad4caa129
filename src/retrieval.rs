//! Query-side search strategies over the vector store.
//!
//! Three interchangeable strategies: plain similarity, diversity-aware
//! MMR (maximal marginal relevance), and similarity with a score floor.
//! An optional [`RelevanceFilter`] runs after the strategy as a pure
//! pass/drop stage that never reorders survivors.

use tracing::debug;

use crate::{
    config::{RetrieverConfig, SearchType},
    document::Document,
    error::{Error, Result},
    store::{VectorIndex, VectorStoreManager, cosine_similarity},
};

/// Search strategy, selected at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchStrategy {
    /// The `k` nearest records by cosine similarity.
    Similarity { k: usize },
    /// Fetch `fetch_k` candidates, then greedily pick `k` balancing
    /// query relevance against dissimilarity to already-picked results.
    /// `lambda` = 1.0 is pure relevance, 0.0 pure diversity.
    Mmr { k: usize, fetch_k: usize, lambda: f32 },
    /// Like similarity, but drop candidates scoring below the floor;
    /// may return fewer than `k` results, including none.
    Threshold { k: usize, score_threshold: f32 },
}

impl SearchStrategy {
    /// Map retriever configuration onto a strategy.
    pub fn from_config(config: &RetrieverConfig) -> Self {
        match config.search_type {
            SearchType::Similarity => Self::Similarity { k: config.top_k },
            SearchType::Mmr => Self::Mmr {
                k: config.top_k,
                fetch_k: config.fetch_k.max(config.top_k),
                lambda: config.lambda_mult.clamp(0.0, 1.0),
            },
            SearchType::SimilarityScoreThreshold => Self::Threshold {
                k: config.top_k,
                score_threshold: config.score_threshold,
            },
        }
    }
}

/// Drops retrieved chunks judged irrelevant to the query.
///
/// The production implementation sits in front of a language model;
/// anything implementing the pass/drop contract plugs in here.
pub trait RelevanceFilter {
    fn keep(&self, query: &str, chunk: &Document) -> Result<bool>;
}

/// A lexical stand-in for an LLM relevance judge: a chunk passes when
/// it shares at least `min_shared_terms` lowercased alphanumeric terms
/// with the query.
#[derive(Debug, Clone, Copy)]
pub struct TermOverlapFilter {
    pub min_shared_terms: usize,
}

impl Default for TermOverlapFilter {
    fn default() -> Self {
        Self { min_shared_terms: 1 }
    }
}

impl RelevanceFilter for TermOverlapFilter {
    fn keep(&self, query: &str, chunk: &Document) -> Result<bool> {
        let query_terms: std::collections::BTreeSet<String> = terms(query).collect();
        let shared = terms(&chunk.content)
            .collect::<std::collections::BTreeSet<String>>()
            .intersection(&query_terms)
            .count();
        Ok(shared >= self.min_shared_terms)
    }
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub score: f32,
    pub chunk: Document,
}

/// Wraps the store's query surface with a search strategy and an
/// optional post-filter.
pub struct Retriever {
    strategy: SearchStrategy,
    filter: Option<Box<dyn RelevanceFilter>>,
}

impl Retriever {
    pub fn new(strategy: SearchStrategy) -> Self {
        Self {
            strategy,
            filter: None,
        }
    }

    pub fn from_config(config: &RetrieverConfig) -> Self {
        Self::new(SearchStrategy::from_config(config))
    }

    /// Layer a pass/drop filter after the search strategy.
    pub fn with_filter(mut self, filter: Box<dyn RelevanceFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Embed the query once, run the selected strategy against the
    /// loaded index, and return matching chunks with their scores,
    /// best first.
    ///
    /// An empty query is [`Error::InvalidInput`]; a store that was
    /// never ingested is [`Error::NotFound`].
    pub fn retrieve(
        &self,
        store: &mut VectorStoreManager,
        query: &str,
    ) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query cannot be empty".into()));
        }

        let query_embedding = store.embedder().embed_query(query)?;
        let Some(index) = store.open_or_none()? else {
            return Err(Error::NotFound {
                kind: "vector index",
                name: store.persist_directory().display().to_string(),
            });
        };

        let hits = match self.strategy {
            SearchStrategy::Similarity { k } => index.search(&query_embedding, k),
            SearchStrategy::Mmr { k, fetch_k, lambda } => {
                let candidates = index.search(&query_embedding, fetch_k.max(k));
                mmr_select(index, candidates, k, lambda)
            }
            SearchStrategy::Threshold { k, score_threshold } => index
                .search(&query_embedding, k)
                .into_iter()
                .filter(|(_, score)| *score >= score_threshold)
                .collect(),
        };

        let mut results = Vec::with_capacity(hits.len());
        for (ordinal, score) in hits {
            let Some(chunk) = index.document(ordinal) else {
                continue;
            };
            let keep = match &self.filter {
                Some(filter) => filter.keep(query, chunk)?,
                None => true,
            };
            if keep {
                results.push(ScoredChunk {
                    score,
                    chunk: chunk.clone(),
                });
            }
        }

        debug!(query, results = results.len(), "retrieval complete");
        Ok(results)
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("strategy", &self.strategy)
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

/// Greedy MMR selection over a candidate pool.
///
/// Candidates arrive with their query-relevance scores; each round
/// picks the one maximizing
/// `lambda * relevance - (1 - lambda) * max(sim(c, selected))`.
fn mmr_select(
    index: &VectorIndex,
    candidates: Vec<(usize, f32)>,
    k: usize,
    lambda: f32,
) -> Vec<(usize, f32)> {
    let mut remaining = candidates;
    let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, (ordinal, relevance)) in remaining.iter().enumerate() {
            let max_to_selected = selected
                .iter()
                .map(|(chosen, _)| {
                    cosine_similarity(index.vector(*ordinal), index.vector(*chosen))
                })
                .fold(0.0f32, f32::max);
            let mmr = lambda * relevance - (1.0 - lambda) * max_to_selected;
            if mmr > best_score {
                best_score = mmr;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::StoreConfig,
        document::keys,
        embedding::HashEmbedder,
    };

    const DIM: usize = 64;

    fn seeded_store(dir: &std::path::Path) -> VectorStoreManager {
        let config = StoreConfig {
            persist_directory: dir.to_path_buf(),
            collection_name: "test".to_string(),
        };
        let mut store =
            VectorStoreManager::new(&config, Arc::new(HashEmbedder::new(DIM)));

        let contents = [
            "the rust borrow checker enforces ownership rules",
            "ownership and borrowing are core rust concepts",
            "a sourdough starter needs regular feeding",
            "feeding schedules for sourdough starters",
        ];
        let chunks: Vec<Document> = contents
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut doc = Document::new(*text);
                doc.set_meta(keys::FILE_NAME, "notes.md");
                doc.set_meta(keys::CHUNK_ID, i as u64);
                doc
            })
            .collect();
        store.add(chunks, true).unwrap();
        store
    }

    #[test]
    fn empty_query_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(tmp.path());
        let retriever = Retriever::new(SearchStrategy::Similarity { k: 3 });

        let err = retriever.retrieve(&mut store, "  ").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn uncreated_store_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            persist_directory: tmp.path().to_path_buf(),
            collection_name: "test".to_string(),
        };
        let mut store =
            VectorStoreManager::new(&config, Arc::new(HashEmbedder::new(DIM)));
        let retriever = Retriever::new(SearchStrategy::Similarity { k: 3 });

        let err = retriever.retrieve(&mut store, "anything").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "vector index", .. }));
    }

    #[test]
    fn similarity_returns_k_best_first() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(tmp.path());
        let retriever = Retriever::new(SearchStrategy::Similarity { k: 2 });

        let results = retriever
            .retrieve(&mut store, "rust borrow checker ownership")
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert!(results[0].chunk.content.contains("rust"));
        // Results carry their identity metadata.
        assert!(results[0].chunk.meta_str(keys::CHUNK_UID).is_some());
    }

    #[test]
    fn threshold_can_return_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(tmp.path());
        let retriever = Retriever::new(SearchStrategy::Threshold {
            k: 3,
            score_threshold: 0.99,
        });

        let results = retriever
            .retrieve(&mut store, "completely unrelated quantum chromodynamics")
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn threshold_keeps_close_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(tmp.path());
        let retriever = Retriever::new(SearchStrategy::Threshold {
            k: 4,
            score_threshold: 0.1,
        });

        let results = retriever
            .retrieve(&mut store, "rust ownership borrowing")
            .unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.score >= 0.1));
    }

    #[test]
    fn mmr_prefers_diverse_over_near_duplicate() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            persist_directory: tmp.path().to_path_buf(),
            collection_name: "test".to_string(),
        };
        let mut store =
            VectorStoreManager::new(&config, Arc::new(HashEmbedder::new(4)));

        // Two near-duplicates of the query direction, one orthogonal.
        let vectors = vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.99, 0.1, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
        ];
        let chunks: Vec<Document> = (0..3)
            .map(|i| {
                let mut doc = Document::new(format!("doc {i}"));
                doc.set_meta(keys::FILE_NAME, "v.md");
                doc.set_meta(keys::CHUNK_ID, i as u64);
                doc
            })
            .collect();
        store.add_with_embeddings(chunks, vectors, true).unwrap();

        let index = store.open_or_none().unwrap().unwrap();
        let query = vec![1.0, 0.0, 0.0, 0.0];
        let candidates = index.search(&query, 3);
        let picked = mmr_select(index, candidates, 2, 0.5);

        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].0, 0, "first pick is the most relevant");
        assert_eq!(picked[1].0, 2, "second pick favors the diverse record");
    }

    #[test]
    fn mmr_pure_relevance_preserves_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(tmp.path());
        let relevance_only = Retriever::new(SearchStrategy::Mmr {
            k: 3,
            fetch_k: 4,
            lambda: 1.0,
        });
        let plain = Retriever::new(SearchStrategy::Similarity { k: 3 });

        let query = "rust ownership";
        let a = relevance_only.retrieve(&mut store, query).unwrap();
        let b = plain.retrieve(&mut store, query).unwrap();
        let uids = |rs: &[ScoredChunk]| -> Vec<String> {
            rs.iter()
                .map(|r| r.chunk.meta_str(keys::CHUNK_UID).unwrap().to_string())
                .collect()
        };
        assert_eq!(uids(&a), uids(&b));
    }

    #[test]
    fn filter_drops_without_reordering() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(tmp.path());
        let retriever = Retriever::new(SearchStrategy::Similarity { k: 4 })
            .with_filter(Box::new(TermOverlapFilter { min_shared_terms: 1 }));

        let results = retriever.retrieve(&mut store, "sourdough starter").unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.chunk.content.contains("sourdough")));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn strategy_from_config_clamps() {
        let config = RetrieverConfig {
            search_type: SearchType::Mmr,
            top_k: 10,
            fetch_k: 5,
            lambda_mult: 1.7,
            score_threshold: 0.7,
        };
        let SearchStrategy::Mmr { k, fetch_k, lambda } =
            SearchStrategy::from_config(&config)
        else {
            panic!("expected MMR strategy");
        };
        assert_eq!(k, 10);
        assert_eq!(fetch_k, 10, "fetch_k grows to at least k");
        assert!((lambda - 1.0).abs() < f32::EPSILON);
    }
}
