use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ragstore::{
    chunking::Chunker,
    cli::{Cli, Command, IngestArgs, QueryArgs, StrategyArg},
    config::{Config, SearchType},
    document::keys,
    embedding::HashEmbedder,
    error,
    ingestion::DocumentLoader,
    retrieval::{Retriever, ScoredChunk, SearchStrategy},
    store::VectorStoreManager,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RAGSTORE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = Config::load(cli.config.as_deref())?;
    let embedder = Arc::new(HashEmbedder::new(config.embedding.dimension));
    let mut store = VectorStoreManager::new(&config.store, embedder);

    match cli.command {
        Command::Ingest(args) => cmd_ingest(&config, &mut store, &args)?,
        Command::Query(args) => cmd_query(&config, &mut store, &args)?,
        Command::Count => {
            println!("{}", store.count()?);
        }
        Command::Reset => {
            store.reset()?;
            println!("store reset: {}", store.persist_directory().display());
        }
    }

    Ok(())
}

fn cmd_ingest(
    config: &Config,
    store: &mut VectorStoreManager,
    args: &IngestArgs,
) -> error::Result<()> {
    let loader = DocumentLoader::new();
    let mut documents = Vec::new();
    for path in &args.paths {
        if path.is_dir() {
            documents.extend(loader.load_dir(path)?);
        } else {
            documents.push(loader.load_file(path)?);
        }
    }

    let chunker = Chunker::new(&config.chunking);
    let chunks = chunker.chunk_documents(&documents);
    if chunks.is_empty() {
        println!("nothing to ingest");
        return Ok(());
    }

    let before = store.count()?;
    store.add(chunks, !args.no_dedup)?;
    let after = store.count()?;
    println!(
        "ingested {} documents: {} new chunks ({} total)",
        documents.len(),
        after - before,
        after
    );
    Ok(())
}

fn cmd_query(
    config: &Config,
    store: &mut VectorStoreManager,
    args: &QueryArgs,
) -> error::Result<()> {
    let mut retriever_config = config.retriever.clone();
    if let Some(strategy) = args.strategy {
        retriever_config.search_type = match strategy {
            StrategyArg::Similarity => SearchType::Similarity,
            StrategyArg::Mmr => SearchType::Mmr,
            StrategyArg::Threshold => SearchType::SimilarityScoreThreshold,
        };
    }
    if let Some(k) = args.top_k {
        retriever_config.top_k = k;
    }
    if let Some(fetch_k) = args.fetch_k {
        retriever_config.fetch_k = fetch_k;
    }
    if let Some(lambda) = args.lambda {
        retriever_config.lambda_mult = lambda;
    }
    if let Some(threshold) = args.threshold {
        retriever_config.score_threshold = threshold;
    }

    let retriever = Retriever::new(SearchStrategy::from_config(&retriever_config));
    let results = retriever.retrieve(store, &args.query)?;

    if args.json {
        format_json(&results, &args.query);
    } else {
        format_human(&results);
    }
    Ok(())
}

fn format_human(results: &[ScoredChunk]) {
    if results.is_empty() {
        println!("no results");
        return;
    }
    for (rank, result) in results.iter().enumerate() {
        let source = result
            .chunk
            .meta_str(keys::SOURCE)
            .unwrap_or("<unknown>");
        let chunk_id = result.chunk.meta_u64(keys::CHUNK_ID).unwrap_or(0);
        println!(
            "{:>2}. [{:.3}] {source} (chunk {chunk_id})",
            rank + 1,
            result.score
        );
        let preview: String = result.chunk.content.chars().take(160).collect();
        println!("    {}", preview.replace('\n', " "));
    }
}

fn format_json(results: &[ScoredChunk], query: &str) {
    let entries: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "score": r.score,
                "content": r.chunk.content,
                "metadata": r.chunk.metadata,
            })
        })
        .collect();
    let output = serde_json::json!({ "query": query, "results": entries });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
    );
}
