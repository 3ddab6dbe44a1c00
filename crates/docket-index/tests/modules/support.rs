//! Shared fixtures: isolated managers and purpose-built embedding providers.

use docket_core::{ChunkRecord, ChunkingConfig, Error, PersistMode, Result, RetrievalConfig};
use docket_index::{
    Chunker, Embedding, EmbeddingProvider, HashingEmbeddingProvider, IndexManager, IndexStore,
    Retriever,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Dimension used by every hashing provider in these tests
pub const DIMENSION: usize = 64;

/// Manager over `root` with small chunks
pub fn manager_at<E: EmbeddingProvider>(
    provider: E,
    root: &Path,
    persist_mode: PersistMode,
) -> IndexManager<E> {
    let chunker = Chunker::new(&ChunkingConfig {
        chunk_size: 300,
        chunk_overlap: 50,
    })
    .unwrap();
    IndexManager::with_parts(provider, chunker, IndexStore::new(root), persist_mode)
}

/// Hashing-backed manager persisting synchronously
pub fn hashing_manager(root: &Path) -> IndexManager<HashingEmbeddingProvider> {
    manager_at(
        HashingEmbeddingProvider::new(DIMENSION),
        root,
        PersistMode::Sync,
    )
}

/// Retriever sharing `manager`
pub fn retriever_for<E: EmbeddingProvider>(manager: Arc<IndexManager<E>>) -> Retriever<E> {
    Retriever::new(manager, RetrievalConfig::default())
}

/// Deterministic provider whose batch calls can be switched to fail and which
/// counts every call.
pub struct SwitchableProvider {
    hashing: HashingEmbeddingProvider,
    dimension_override: Option<usize>,
    fail_batches: AtomicBool,
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
}

impl Default for SwitchableProvider {
    fn default() -> Self {
        Self {
            hashing: HashingEmbeddingProvider::new(DIMENSION),
            dimension_override: None,
            fail_batches: AtomicBool::new(false),
            batch_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
        }
    }
}

impl SwitchableProvider {
    /// Batch embeddings of the wrong dimension; the sentinel stays correct
    pub fn with_batch_dimension(dimension: usize) -> Self {
        Self {
            dimension_override: Some(dimension),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_batches.store(failing, Ordering::SeqCst);
    }
}

impl EmbeddingProvider for SwitchableProvider {
    async fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hashing.embed_text(text))
    }

    async fn embed_many(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(Error::RateLimited("HTTP 429 Too Many Requests".to_owned()));
        }
        Ok(texts
            .iter()
            .map(|text| match self.dimension_override {
                Some(dimension) => HashingEmbeddingProvider::new(dimension).embed_text(text),
                None => self.hashing.embed_text(text),
            })
            .collect())
    }
}

/// Provider that cannot embed anything, not even the sentinel
pub struct DeadProvider;

impl EmbeddingProvider for DeadProvider {
    async fn ensure_available(&self) -> Result<()> {
        Err(Error::Provider("connection refused".to_owned()))
    }

    async fn embed_one(&self, _text: &str) -> Result<Embedding> {
        Err(Error::Provider("connection refused".to_owned()))
    }

    async fn embed_many(&self, _texts: Vec<String>) -> Result<Vec<Embedding>> {
        Err(Error::Provider("connection refused".to_owned()))
    }
}

/// Whether a record is the placeholder chunk
pub fn is_sentinel(record: &ChunkRecord) -> bool {
    record.is_sentinel && record.text == ChunkRecord::SENTINEL_TEXT
}
