//! The embedding seam between text and the vector store.
//!
//! Real models plug in behind [`Embedder`]; the built-in
//! [`HashEmbedder`] is a deterministic, dependency-free implementation
//! (feature hashing over word tokens) good enough for offline use and
//! tests. Implementations must produce a fixed dimension across calls.

use rayon::prelude::*;

use crate::error::Result;

/// Maps text to fixed-length vectors, in batch (documents) or singly
/// (queries).
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Output dimensionality, constant for the lifetime of this embedder.
    fn dimension(&self) -> usize;
}

/// A bag-of-words feature-hashing embedder.
///
/// Each lowercased alphanumeric token is hashed (blake3, so stable
/// across processes) into one of `dimension` buckets with a hash-derived
/// sign; the resulting vector is L2-normalized. Identical texts always
/// produce identical vectors.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokens(text) {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let value = u64::from_le_bytes(bytes[..8].try_into().unwrap_or([0; 8]));
            let bucket = (value % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashEmbedder {
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.par_iter().map(|t| self.embed_one(t)).collect())
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_one(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
