use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the docket binary
#[derive(Debug, Parser)]
#[command(name = "docket")]
#[command(about = "Index legal documents and retrieve relevant passages", long_about = None)]
pub struct Cli {
    /// Configuration file; defaults to `~/.docket/config.toml`
    #[arg(long, global = true, help = "Path to the configuration file")]
    pub config: Option<PathBuf>,

    /// Index directory overriding the configured one
    #[arg(long, global = true, help = "Index directory (overrides config)")]
    pub index_dir: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a document to the index
    #[command(about = "Chunk, embed and index a plain-text document")]
    Ingest {
        /// Identifier of the document
        #[arg(help = "Document identifier")]
        document: String,

        /// Text file; form feeds separate pages
        #[arg(help = "Plain-text file, pages separated by form feeds")]
        path: PathBuf,

        /// Optional collection scope
        #[arg(short, long, help = "Collection the document belongs to")]
        collection: Option<String>,
    },

    /// Add every text file in a directory
    #[command(about = "Index every .txt file in a directory, one document per file")]
    IngestDir {
        /// Directory to scan
        #[arg(help = "Directory holding plain-text files")]
        directory: PathBuf,

        /// Optional collection scope
        #[arg(short, long, help = "Collection the documents belong to")]
        collection: Option<String>,
    },

    /// Retrieve passages for a question
    #[command(about = "Retrieve the passages most relevant to a question")]
    Query {
        /// Question text
        #[arg(help = "The question to look up")]
        query: String,

        /// Number of passages
        #[arg(short = 'k', long = "limit", help = "Maximum passages to return")]
        limit: Option<usize>,

        /// Optional collection scope
        #[arg(short, long, help = "Only search this collection")]
        collection: Option<String>,
    },

    /// Remove a document or a whole collection
    #[command(about = "Delete a document or a collection from the index")]
    Delete {
        /// Document to delete
        #[arg(
            long,
            conflicts_with = "collection",
            required_unless_present = "collection",
            help = "Document identifier"
        )]
        document: Option<String>,

        /// Collection to delete
        #[arg(long, help = "Collection identifier")]
        collection: Option<String>,
    },

    /// Print index statistics
    #[command(about = "Show per-collection index statistics")]
    Stats,

    /// Check the embedding provider
    #[command(about = "Check that the embedding model is reachable")]
    Check,
}
