//! Core types for the docket document index.
//!
//! This crate provides the error taxonomy, configuration model, identifier
//! newtypes and the fixed metadata records shared by the indexing and
//! retrieval crates.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Test allows"
    )
)]

/// Configuration model and loading.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Identifier newtypes for documents, collections and chunks.
pub mod ids;
/// Document, chunk and passage records.
pub mod types;

pub use config::{
    ChunkingConfig, DocketConfig, EmbeddingConfig, IndexConfig, IngestConfig, LoggingConfig,
    PersistMode, ProviderKind, RetrievalConfig, RetryConfig,
};
pub use error::{Error, Result};
pub use ids::{ChunkId, CollectionId, DocumentId};
pub use types::{ChunkRecord, PageText, RetrievedPassage, SourceDocument};
