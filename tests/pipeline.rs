//! End-to-end pipeline tests: load -> chunk -> embed -> store -> retrieve.

use std::{path::Path, sync::Arc};

use ragstore::{
    Chunker, Document, DocumentLoader, HashEmbedder, Retriever, VectorStoreManager,
    config::{ChunkingConfig, RetrieverConfig, SearchType, StoreConfig},
    document::keys,
    retrieval::SearchStrategy,
};

const DIM: usize = 64;

fn store_at(dir: &Path) -> VectorStoreManager {
    let config = StoreConfig {
        persist_directory: dir.to_path_buf(),
        collection_name: "pipeline".to_string(),
    };
    VectorStoreManager::new(&config, Arc::new(HashEmbedder::new(DIM)))
}

fn chunker(chunk_size: usize, chunk_overlap: usize) -> Chunker {
    Chunker::new(&ChunkingConfig {
        chunk_size,
        chunk_overlap,
    })
}

#[test]
fn thousand_char_record_walkthrough() {
    // One 1000-char record, chunk_size 400 / overlap 0: exactly three
    // chunks, ids 0..3, each claiming total_chunks == 3.
    let tmp = tempfile::tempdir().unwrap();
    let mut record = Document::new("A".repeat(1000));
    record.set_meta(keys::SOURCE, "doc1.txt");

    let chunks = chunker(400, 0).chunk_documents(&[record]);
    assert_eq!(chunks.len(), 3);
    for (idx, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.meta_u64(keys::CHUNK_ID), Some(idx as u64));
        assert_eq!(chunk.meta_u64(keys::TOTAL_CHUNKS), Some(3));
        assert_eq!(chunk.meta_str(keys::SOURCE), Some("doc1.txt"));
    }

    let mut store = store_at(tmp.path());
    store.add(chunks.clone(), true).unwrap();
    assert_eq!(store.count().unwrap(), 3);

    // Re-adding the same chunks with dedup is a no-op.
    store.add(chunks, true).unwrap();
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn reingesting_same_files_is_idempotent() {
    let docs_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        docs_dir.path().join("rust.md"),
        "# Rust\n\nThe borrow checker enforces ownership.\n\nLifetimes tie references to scopes.",
    )
    .unwrap();
    std::fs::write(
        docs_dir.path().join("bread.md"),
        "# Bread\n\nA sourdough starter needs regular feeding.",
    )
    .unwrap();

    let store_dir = tempfile::tempdir().unwrap();
    let mut store = store_at(store_dir.path());
    let loader = DocumentLoader::new();
    let splitter = chunker(60, 0);

    for _ in 0..2 {
        let docs = loader.load_dir(docs_dir.path()).unwrap();
        let chunks = splitter.chunk_documents(&docs);
        store.add(chunks, true).unwrap();
    }

    let once = store.count().unwrap();
    let docs = loader.load_dir(docs_dir.path()).unwrap();
    let chunks = splitter.chunk_documents(&docs);
    store.add(chunks, true).unwrap();
    assert_eq!(store.count().unwrap(), once);
}

#[test]
fn disjoint_sets_accumulate_exactly() {
    let tmp = tempfile::tempdir().unwrap();
    let mut store = store_at(tmp.path());
    let splitter = chunker(400, 0);

    let mut a = Document::new("alpha content ".repeat(10));
    a.set_meta(keys::SOURCE, "a.txt");
    let chunks_a = splitter.chunk_documents(&[a]);
    store.add(chunks_a.clone(), true).unwrap();
    let count_a = store.count().unwrap();
    assert_eq!(count_a, chunks_a.len());

    let mut b = Document::new("totally different beta material ".repeat(10));
    b.set_meta(keys::SOURCE, "b.txt");
    let chunks_b = splitter.chunk_documents(&[b]);
    store.add(chunks_b.clone(), true).unwrap();

    assert_eq!(store.count().unwrap(), count_a + chunks_b.len());
}

#[test]
fn fresh_manager_sees_persisted_records() {
    let tmp = tempfile::tempdir().unwrap();
    let expected;
    {
        let mut store = store_at(tmp.path());
        let mut record = Document::new("persisted once, visible forever ".repeat(20));
        record.set_meta(keys::SOURCE, "p.txt");
        let chunks = chunker(100, 0).chunk_documents(&[record]);
        expected = chunks.len();
        store.add(chunks, true).unwrap();
    }

    let mut fresh = store_at(tmp.path());
    assert_eq!(fresh.count().unwrap(), expected);
}

#[test]
fn query_finds_relevant_chunk_with_identity() {
    let docs_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        docs_dir.path().join("notes.txt"),
        "The borrow checker enforces ownership rules in rust.\n\n\
         Sourdough bread rises slowly overnight.",
    )
    .unwrap();

    let store_dir = tempfile::tempdir().unwrap();
    let mut store = store_at(store_dir.path());
    let docs = DocumentLoader::new().load_dir(docs_dir.path()).unwrap();
    let chunks = chunker(60, 0).chunk_documents(&docs);
    store.add(chunks, true).unwrap();

    let retriever = Retriever::new(SearchStrategy::Similarity { k: 1 });
    let results = retriever
        .retrieve(&mut store, "rust borrow checker ownership")
        .unwrap();

    assert_eq!(results.len(), 1);
    let top = &results[0];
    assert!(top.chunk.content.contains("borrow checker"));
    assert_eq!(top.chunk.meta_str(keys::FILE_NAME), Some("notes.txt"));
    assert!(top.chunk.meta_str(keys::CHUNK_UID).is_some());
}

#[test]
fn high_threshold_returns_empty_not_error() {
    let tmp = tempfile::tempdir().unwrap();
    let mut store = store_at(tmp.path());
    let mut record = Document::new("nothing like the query at all");
    record.set_meta(keys::SOURCE, "x.txt");
    store
        .add(chunker(400, 0).chunk_documents(&[record]), true)
        .unwrap();

    let retriever = Retriever::new(SearchStrategy::Threshold {
        k: 5,
        score_threshold: 0.99,
    });
    let results = retriever
        .retrieve(&mut store, "unrelated quantum chromodynamics lattice")
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn precomputed_embeddings_reusable_across_stores() {
    // Embed once, feed two stores: both end up with the same records.
    let embedder = HashEmbedder::new(DIM);
    let mut record = Document::new("shared embedding payload ".repeat(8));
    record.set_meta(keys::SOURCE, "shared.txt");
    let chunks = chunker(80, 0).chunk_documents(&[record]);

    use ragstore::Embedder;
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embedder.embed_documents(&texts).unwrap();

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let mut store_a = store_at(dir_a.path());
    let mut store_b = store_at(dir_b.path());

    store_a
        .add_with_embeddings(chunks.clone(), embeddings.clone(), true)
        .unwrap();
    store_b.add_with_embeddings(chunks, embeddings, true).unwrap();

    assert_eq!(store_a.count().unwrap(), store_b.count().unwrap());

    let ids_a = store_a.open_or_none().unwrap().unwrap().list_ids();
    let ids_b = store_b.open_or_none().unwrap().unwrap().list_ids();
    assert_eq!(ids_a, ids_b);
}

#[test]
fn configured_mmr_retriever_runs_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let mut store = store_at(tmp.path());

    let contents = [
        "rust ownership and borrowing",
        "ownership rules in rust explained again",
        "an unrelated note about gardening tomatoes",
    ];
    let mut docs = Vec::new();
    for (i, text) in contents.iter().enumerate() {
        let mut doc = Document::new(*text);
        doc.set_meta(keys::SOURCE, format!("n{i}.txt"));
        docs.push(doc);
    }
    store.add(chunker(400, 0).chunk_documents(&docs), true).unwrap();

    let retriever = Retriever::from_config(&RetrieverConfig {
        search_type: SearchType::Mmr,
        top_k: 2,
        fetch_k: 3,
        lambda_mult: 0.5,
        score_threshold: 0.7,
    });
    let results = retriever.retrieve(&mut store, "rust ownership").unwrap();
    assert_eq!(results.len(), 2);
}
