//! Index lifecycle: lazy loading, copy-on-write mutation, paired persistence
//! and corruption recovery.
//!
//! Readers clone the published [`IndexSnapshot`] under a short read lock and
//! search without holding any lock. Writers are serialised by a separate gate,
//! embed before taking it, build the next snapshot off to the side and swap it
//! in under a short write lock.

use core::fmt;
use std::sync::Arc;
use tokio::spawn;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use docket_core::{
    ChunkId, ChunkRecord, CollectionId, DocketConfig, DocumentId, Error, PersistMode, Result,
    SourceDocument,
};

use crate::catalog::ChunkCatalog;
use crate::chunker::Chunker;
use crate::embedding::EmbeddingProvider;
use crate::snapshot::IndexSnapshot;
use crate::stats::IndexStats;
use crate::store::IndexStore;
use crate::vector_index::{Neighbor, VectorIndex};

/// Lifecycle state of an [`IndexManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Nothing loaded yet
    Unloaded,
    /// Reading persisted artifacts
    Loading,
    /// Serving reads and accepting writes
    Ready,
    /// A write is building the next snapshot; reads still see the previous one
    Rebuilding,
    /// Both loading and fresh initialisation failed
    Failed,
}

impl fmt::Display for IndexState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Rebuilding => "rebuilding",
            Self::Failed => "failed",
        };
        formatter.write_str(name)
    }
}

/// What a delete removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    /// Every chunk of one document
    Document(DocumentId),
    /// Every chunk of one collection
    Collection(CollectionId),
}

impl DeleteScope {
    /// Whether `record` falls inside this scope. The sentinel never does.
    pub fn matches(&self, record: &ChunkRecord) -> bool {
        if record.is_sentinel {
            return false;
        }
        match self {
            Self::Document(document_id) => &record.source_document_id == document_id,
            Self::Collection(collection_id) => record.collection_id.as_ref() == Some(collection_id),
        }
    }
}

impl fmt::Display for DeleteScope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(document_id) => write!(formatter, "document {document_id}"),
            Self::Collection(collection_id) => write!(formatter, "collection {collection_id}"),
        }
    }
}

/// Outcome of a successful add.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    /// Documents in the batch
    pub documents: usize,
    /// Chunks committed
    pub chunks_added: usize,
    /// Ids assigned to the committed chunks, in order
    pub chunk_ids: Vec<ChunkId>,
}

/// State guarded by the read/write lock
struct Shared {
    state: IndexState,
    snapshot: Option<Arc<IndexSnapshot>>,
}

/// Chunk text and metadata waiting for its embedding
struct PendingChunk {
    document_id: DocumentId,
    collection_id: Option<CollectionId>,
    page: Option<u32>,
    offset: usize,
    chunk_index: u32,
    total_chunks: u32,
    text: String,
}

impl PendingChunk {
    fn into_record(self, chunk_id: ChunkId) -> ChunkRecord {
        ChunkRecord {
            chunk_id,
            source_document_id: self.document_id,
            collection_id: self.collection_id,
            page: self.page,
            offset: self.offset,
            chunk_index: self.chunk_index,
            total_chunks: self.total_chunks,
            text: self.text,
            is_sentinel: false,
        }
    }
}

/// Owns the vector index and catalog of one index instance.
pub struct IndexManager<E> {
    /// Embedding provider used for chunks and the sentinel
    provider: E,
    /// Chunker applied to incoming documents
    chunker: Chunker,
    /// Chunks kept per document; the rest are dropped
    max_chunks_per_document: usize,
    /// Paired on-disk artifacts
    store: Arc<IndexStore>,
    /// Persist before or after publishing
    persist_mode: PersistMode,
    /// Lifecycle state and published snapshot
    shared: RwLock<Shared>,
    /// Single-writer gate
    writer: Mutex<()>,
    /// In-flight background saves
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: EmbeddingProvider> IndexManager<E> {
    /// Create a manager from configuration. Nothing is read until first use.
    ///
    /// # Errors
    /// Returns a configuration error if the chunking settings are invalid
    pub fn new(provider: E, config: &DocketConfig) -> Result<Self> {
        let chunker = Chunker::new(&config.chunking)?;
        Ok(Self::with_parts(
            provider,
            chunker,
            IndexStore::new(config.index.storage_dir.clone()),
            config.index.persist_mode,
        )
        .with_chunk_limit(config.ingest.max_chunks_per_document))
    }

    /// Create a manager from already-built parts
    pub fn with_parts(
        provider: E,
        chunker: Chunker,
        store: IndexStore,
        persist_mode: PersistMode,
    ) -> Self {
        Self {
            provider,
            chunker,
            max_chunks_per_document: usize::MAX,
            store: Arc::new(store),
            persist_mode,
            shared: RwLock::new(Shared {
                state: IndexState::Unloaded,
                snapshot: None,
            }),
            writer: Mutex::new(()),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Cap the chunks indexed per document; a zero limit is treated as one
    #[must_use]
    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.max_chunks_per_document = limit.max(1);
        self
    }

    /// Embedding provider shared with the retriever
    pub const fn provider(&self) -> &E {
        &self.provider
    }

    /// Chunker applied to added documents
    pub const fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Persistence location
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Current lifecycle state
    pub async fn state(&self) -> IndexState {
        self.shared.read().await.state
    }

    /// Entries in the published snapshot, sentinel included; zero before loading
    pub async fn len(&self) -> usize {
        self.shared
            .read()
            .await
            .snapshot
            .as_ref()
            .map_or(0, |snapshot| snapshot.len())
    }

    /// Whether no snapshot entries are published
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Load persisted state, or initialise a sentinel-only index if it is
    /// missing or corrupt. Calling this on a loaded manager is a cheap no-op.
    ///
    /// # Errors
    /// Returns `IndexUnavailable` if the manager is, or ends up, in the failed state
    pub async fn load(&self) -> Result<()> {
        if let Some(outcome) = self.loaded_outcome().await {
            return outcome;
        }
        let _writer = self.writer.lock().await;
        if let Some(outcome) = self.loaded_outcome().await {
            return outcome;
        }

        self.set_state(IndexState::Loading).await;
        info!("Loading index from {}", self.store.root().display());

        let loaded = self
            .store
            .load()
            .await
            .and_then(|(vectors, catalog)| IndexSnapshot::new(0, vectors, catalog));

        match loaded {
            Ok(snapshot) => {
                info!("  Index ready with {} entries", snapshot.len());
                self.publish(Arc::new(snapshot), IndexState::Ready).await;
                Ok(())
            }
            Err(error) => {
                warn!(
                    "  Index at {} unusable ({error}); starting from an empty index",
                    self.store.root().display()
                );
                self.initialise_fresh().await
            }
        }
    }

    /// Consistent snapshot for reading, loading on first use
    ///
    /// # Errors
    /// Returns `IndexUnavailable` if the index cannot be loaded
    pub async fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.load().await?;
        self.current().await
    }

    /// Nearest neighbours of an already-embedded query
    ///
    /// # Errors
    /// Returns `DimensionMismatch` for a query of the wrong dimension, or
    /// `IndexUnavailable` if the index cannot be loaded
    pub async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        self.snapshot().await?.search(query, limit)
    }

    /// Chunk, embed and append a batch of documents.
    ///
    /// The batch is committed entirely or not at all. Embedding happens before
    /// the writer gate is taken, so a slow provider never blocks readers or
    /// other writers' swaps.
    ///
    /// # Errors
    /// Returns provider errors, `DimensionMismatch`, or persistence errors; the
    /// published snapshot is unchanged in every error case
    pub async fn add(&self, documents: Vec<SourceDocument>) -> Result<AddReport> {
        self.load().await?;

        if let Some(reserved) = documents
            .iter()
            .find(|document| document.document_id.is_system())
        {
            return Err(Error::Other(format!(
                "Document id '{}' is reserved",
                reserved.document_id
            )));
        }
        if let Some(reserved) = documents.iter().find(|document| {
            document
                .collection_id
                .as_ref()
                .is_some_and(CollectionId::is_default)
        }) {
            return Err(Error::Other(format!(
                "Collection '{}' is reserved for unscoped documents ({})",
                CollectionId::DEFAULT,
                reserved.document_id
            )));
        }

        let pending = self.chunk_documents(&documents);
        if pending.is_empty() {
            debug!("  No chunks produced for {} documents", documents.len());
            return Ok(AddReport {
                documents: documents.len(),
                ..AddReport::default()
            });
        }

        let texts: Vec<String> = pending.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.provider.embed_many(texts).await?;
        if embeddings.len() != pending.len() {
            return Err(Error::Provider(format!(
                "Requested {} embeddings but received {}",
                pending.len(),
                embeddings.len()
            )));
        }

        let _writer = self.writer.lock().await;
        let current = self.current().await?;
        self.set_state(IndexState::Rebuilding).await;
        let outcome = self.commit_add(&current, pending, embeddings).await;
        self.set_state(IndexState::Ready).await;

        let report = AddReport {
            documents: documents.len(),
            ..outcome?
        };
        info!(
            "Indexed {} chunks from {} documents",
            report.chunks_added, report.documents
        );
        Ok(report)
    }

    /// Remove every chunk in `scope` and rebuild the index from the survivors
    /// without re-embedding. Returns the number of chunks removed.
    ///
    /// # Errors
    /// Returns persistence errors, or provider errors if the sentinel has to be
    /// re-created; the published snapshot is unchanged in every error case
    pub async fn delete(&self, scope: DeleteScope) -> Result<usize> {
        self.load().await?;
        let _writer = self.writer.lock().await;
        let current = self.current().await?;

        let removed = current
            .catalog()
            .filter(|record| scope.matches(record))
            .len();
        if removed == 0 {
            debug!("  Nothing indexed for {scope}");
            return Ok(0);
        }

        self.set_state(IndexState::Rebuilding).await;
        let outcome = self.commit_delete(&current, &scope).await;
        self.set_state(IndexState::Ready).await;
        outcome?;

        info!("Deleted {removed} chunks for {scope}");
        Ok(removed)
    }

    /// Per-collection statistics of the published snapshot
    ///
    /// # Errors
    /// Returns `IndexUnavailable` if the index cannot be loaded
    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats::from_catalog(self.snapshot().await?.catalog()))
    }

    /// Wait for background saves started so far
    ///
    /// # Errors
    /// Returns an error if a save task panicked
    pub async fn flush(&self) -> Result<()> {
        let handles: Vec<JoinHandle<()>> = self.background.lock().await.drain(..).collect();
        for handle in handles {
            handle
                .await
                .map_err(|error| Error::Other(format!("Task join error: {error}")))?;
        }
        Ok(())
    }

    async fn loaded_outcome(&self) -> Option<Result<()>> {
        match self.shared.read().await.state {
            IndexState::Ready | IndexState::Rebuilding => Some(Ok(())),
            IndexState::Failed => Some(Err(Error::IndexUnavailable(
                "index failed to load and could not be initialised".to_owned(),
            ))),
            IndexState::Unloaded | IndexState::Loading => None,
        }
    }

    async fn current(&self) -> Result<Arc<IndexSnapshot>> {
        self.shared
            .read()
            .await
            .snapshot
            .clone()
            .ok_or_else(|| Error::IndexUnavailable("no snapshot published".to_owned()))
    }

    async fn set_state(&self, state: IndexState) {
        let mut shared = self.shared.write().await;
        if shared.state != state {
            debug!("  Index state {} -> {state}", shared.state);
            shared.state = state;
        }
    }

    async fn publish(&self, snapshot: Arc<IndexSnapshot>, state: IndexState) {
        let mut shared = self.shared.write().await;
        shared.snapshot = Some(snapshot);
        shared.state = state;
    }

    async fn swap(&self, snapshot: Arc<IndexSnapshot>) {
        self.shared.write().await.snapshot = Some(snapshot);
    }

    /// Build, persist and publish a sentinel-only index, or enter `Failed`.
    async fn initialise_fresh(&self) -> Result<()> {
        match self.sentinel_snapshot(1, ChunkCatalog::new()).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                if let Err(error) = self.store.save(Arc::clone(&snapshot)).await {
                    warn!("  Failed to persist fresh index: {error}");
                }
                self.publish(snapshot, IndexState::Ready).await;
                info!("  Initialised empty index with sentinel chunk");
                Ok(())
            }
            Err(error) => {
                error!("Index could not be initialised: {error}");
                self.set_state(IndexState::Failed).await;
                Err(Error::IndexUnavailable(format!(
                    "index could not be loaded or initialised: {error}"
                )))
            }
        }
    }

    async fn sentinel_snapshot(&self, revision: u64, base: ChunkCatalog) -> Result<IndexSnapshot> {
        let vector = self.provider.embed_one(ChunkRecord::SENTINEL_TEXT).await?;
        let mut vectors = VectorIndex::new();
        vectors.add(vec![vector])?;

        let mut catalog = base;
        let chunk_id = catalog.allocate_id();
        catalog.append(ChunkRecord::sentinel(chunk_id));
        IndexSnapshot::new(revision, vectors, catalog)
    }

    fn chunk_documents(&self, documents: &[SourceDocument]) -> Vec<PendingChunk> {
        let mut pending = Vec::new();
        for document in documents {
            let first = pending.len();
            let mut truncated = false;
            'pages: for page in &document.pages {
                for chunk in self.chunker.chunks(&page.text) {
                    if pending.len() - first == self.max_chunks_per_document {
                        truncated = true;
                        break 'pages;
                    }
                    pending.push(PendingChunk {
                        document_id: document.document_id.clone(),
                        collection_id: document.collection_id.clone(),
                        page: page.page,
                        offset: chunk.offset,
                        chunk_index: (pending.len() - first) as u32,
                        total_chunks: 0,
                        text: chunk.text.to_owned(),
                    });
                }
            }
            if truncated {
                warn!(
                    "  Document {} truncated to {} chunks",
                    document.document_id, self.max_chunks_per_document
                );
            }
            let total = (pending.len() - first) as u32;
            for chunk in &mut pending[first..] {
                chunk.total_chunks = total;
            }
        }
        pending
    }

    async fn commit_add(
        &self,
        current: &IndexSnapshot,
        pending: Vec<PendingChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<AddReport> {
        let (mut vectors, mut catalog) = current.to_parts();
        vectors
            .add(embeddings)
            .inspect_err(|error| warn!("  Rejecting batch: {error}"))?;

        let mut chunk_ids = Vec::with_capacity(pending.len());
        for chunk in pending {
            let chunk_id = catalog.allocate_id();
            catalog.append(chunk.into_record(chunk_id));
            chunk_ids.push(chunk_id);
        }

        let next = IndexSnapshot::new(current.revision() + 1, vectors, catalog)?;
        self.commit(Arc::new(next)).await?;
        Ok(AddReport {
            documents: 0,
            chunks_added: chunk_ids.len(),
            chunk_ids,
        })
    }

    async fn commit_delete(&self, current: &IndexSnapshot, scope: &DeleteScope) -> Result<()> {
        let survivors: Vec<usize> = current
            .catalog()
            .filter(|record| !scope.matches(record))
            .into_iter()
            .map(|(position, _)| position)
            .collect();
        let revision = current.revision() + 1;

        let next = if survivors.is_empty() {
            info!("  No chunks survive; re-creating sentinel");
            let base = ChunkCatalog::with_next_id(current.catalog().next_chunk_id());
            self.sentinel_snapshot(revision, base).await?
        } else {
            let vectors = current.vectors().retain_positions(&survivors);
            let mut catalog = current.catalog().clone();
            catalog.remove_where(|record| scope.matches(record));
            IndexSnapshot::new(revision, vectors, catalog)?
        };

        self.commit(Arc::new(next)).await
    }

    /// Persist and publish `next` according to the persistence mode.
    async fn commit(&self, next: Arc<IndexSnapshot>) -> Result<()> {
        match self.persist_mode {
            PersistMode::Sync => {
                self.store.save(Arc::clone(&next)).await?;
                self.swap(next).await;
            }
            PersistMode::Background => {
                self.swap(Arc::clone(&next)).await;
                let store = Arc::clone(&self.store);
                let handle = spawn(async move {
                    if let Err(error) = store.save(next).await {
                        warn!("  Background persistence failed: {error}");
                    }
                });
                let mut background = self.background.lock().await;
                background.retain(|task| !task.is_finished());
                background.push(handle);
            }
        }
        Ok(())
    }
}
