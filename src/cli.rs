use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "ragstore",
    about = "A local vector store and retrieval pipeline for RAG applications"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load, chunk, embed, and store documents
    Ingest(IngestArgs),
    /// Retrieve the chunks most relevant to a query
    Query(QueryArgs),
    /// Show the number of stored records
    Count,
    /// Delete the persisted index and start over
    Reset,
}

#[derive(Debug, clap::Args)]
pub struct IngestArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Store duplicate chunks instead of skipping them
    #[arg(long)]
    pub no_dedup: bool,
}

/// Search strategy names accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Similarity,
    Mmr,
    Threshold,
}

#[derive(Debug, clap::Args)]
pub struct QueryArgs {
    /// The query text
    pub query: String,

    /// Override the configured search strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Number of results to return
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Candidate pool size for MMR
    #[arg(long)]
    pub fetch_k: Option<usize>,

    /// MMR balance (1.0 = relevance, 0.0 = diversity)
    #[arg(long)]
    pub lambda: Option<f32>,

    /// Minimum cosine similarity for threshold search
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
