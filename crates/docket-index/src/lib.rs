//! Document indexing and semantic retrieval.
//!
//! Text is cut into overlapping chunks, embedded through an [`EmbeddingProvider`],
//! and stored in a flat cosine [`VectorIndex`] kept in lockstep with a
//! [`ChunkCatalog`]. The [`IndexManager`] owns both as one copy-on-write snapshot
//! and persists them as a pair; the [`Retriever`] is the query facade.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Test allows"
    )
)]

/// Chunk metadata catalog
pub mod catalog;
/// Overlapping text chunker
pub mod chunker;
/// Embedding provider boundary and implementations
pub mod embedding;
/// Index lifecycle, mutation and recovery
pub mod manager;
/// Query facade over the index manager
pub mod retriever;
/// Consistent vector/catalog pairs
pub mod snapshot;
/// Per-collection statistics
pub mod stats;
/// Paired on-disk persistence
pub mod store;
/// Flat cosine-similarity vector index
pub mod vector_index;

pub use catalog::ChunkCatalog;
pub use chunker::{Chunker, Chunks, TextChunk};
pub use embedding::{
    ConfiguredProvider, Embedding, EmbeddingProvider, HashingEmbeddingProvider,
    OllamaEmbeddingClient, ResilientProvider,
};
pub use manager::{AddReport, DeleteScope, IndexManager, IndexState};
pub use retriever::Retriever;
pub use snapshot::IndexSnapshot;
pub use stats::{CollectionStats, IndexStats};
pub use store::IndexStore;
pub use vector_index::{Neighbor, VectorIndex};
