//! Splitting documents into overlapping chunks.
//!
//! Splits prefer natural boundaries: paragraph breaks first, then line
//! breaks, then spaces, falling back to character cuts only when a
//! single unbroken run exceeds the chunk size. Sizes are measured in
//! characters, so multi-byte text never splits mid-codepoint.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::{
    config::ChunkingConfig,
    document::{Document, keys},
};

/// Boundary hierarchy tried in order when splitting.
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Splits records into overlapping windows and enriches each chunk with
/// `chunk_id` / `total_chunks` metadata.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Build a chunker from configuration.
    ///
    /// The overlap is clamped below the chunk size so windows always
    /// advance.
    pub fn new(config: &ChunkingConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let chunk_overlap = config.chunk_overlap.min(chunk_size.saturating_sub(1));
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split each record independently into chunks.
    ///
    /// Every chunk inherits its parent record's metadata plus `chunk_id`
    /// (0-based rank within that record) and `total_chunks`. Windows
    /// never span two input records. Empty input is a logged no-op.
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Document> {
        if documents.is_empty() {
            warn!("no documents provided for chunking");
            return Vec::new();
        }

        let mut all_chunks = Vec::new();
        for doc in documents {
            let splits = self.split_text(&doc.content);
            let total = splits.len();
            for (idx, text) in splits.into_iter().enumerate() {
                let mut chunk = Document::with_metadata(text, doc.metadata.clone());
                chunk.set_meta(keys::CHUNK_ID, idx as u64);
                chunk.set_meta(keys::TOTAL_CHUNKS, total as u64);
                all_chunks.push(chunk);
            }
        }

        debug!(
            documents = documents.len(),
            chunks = all_chunks.len(),
            "chunked documents"
        );
        all_chunks
    }

    /// Split raw text into windows of at most `chunk_size` characters,
    /// consecutive windows sharing up to `chunk_overlap` characters.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator actually present in the text; "" always matches.
        let sep_idx = separators
            .iter()
            .position(|s| text.contains(s))
            .unwrap_or(separators.len() - 1);
        let sep = separators[sep_idx];
        let deeper = &separators[sep_idx + 1..];

        let pieces: Vec<String> = if sep.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(sep).map(str::to_string).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();

        for piece in pieces {
            if piece.chars().count() < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            // Oversized run: flush what fits, then recurse with finer
            // separators.
            if !fitting.is_empty() {
                self.merge_pieces(std::mem::take(&mut fitting), sep, &mut chunks);
            }
            if deeper.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, deeper));
            }
        }
        if !fitting.is_empty() {
            self.merge_pieces(fitting, sep, &mut chunks);
        }

        chunks
    }

    /// Greedily pack pieces into windows of at most `chunk_size`
    /// characters, retaining a tail of up to `chunk_overlap` characters
    /// between consecutive windows.
    fn merge_pieces(&self, pieces: Vec<String>, sep: &str, out: &mut Vec<String>) {
        let sep_len = sep.chars().count();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = piece.chars().count();
            let added = len + if window.is_empty() { 0 } else { sep_len };

            if !window.is_empty() && total + added > self.chunk_size {
                Self::flush(&window, sep, out);

                // Drop from the front until the retained tail fits the
                // overlap budget and leaves room for the next piece.
                while !window.is_empty()
                    && (total > self.chunk_overlap
                        || total + len + sep_len > self.chunk_size)
                {
                    let (_, front_len) = window.pop_front().unwrap_or_default();
                    total -= front_len + if window.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back((piece, len));
        }

        Self::flush(&window, sep, out);
    }

    fn flush(window: &VecDeque<(String, usize)>, sep: &str, out: &mut Vec<String>) {
        if window.is_empty() {
            return;
        }
        let joined = window
            .iter()
            .map(|(piece, _)| piece.as_str())
            .collect::<Vec<_>>()
            .join(sep);
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
}
