//! Command handlers sharing one index manager and one retriever.

use anyhow::{Context as _, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs as async_fs;
use tracing::{info, warn};

use docket_core::{
    ChunkId, CollectionId, DocketConfig, DocumentId, IngestConfig, RetrievedPassage,
    SourceDocument,
};
use docket_index::{
    ConfiguredProvider, DeleteScope, EmbeddingProvider as _, IndexManager, IndexStats,
    ResilientProvider, Retriever,
};

/// Provider stack used by the binary
pub type Provider = ResilientProvider<ConfiguredProvider>;

/// Page separator in extracted text files
const PAGE_BREAK: char = '\u{c}';

/// Result of an ingest command
#[derive(Debug, Serialize)]
pub struct IngestSummary {
    /// Document that was indexed
    pub document: DocumentId,
    /// Chunks committed
    pub chunks_added: usize,
    /// Ids of the committed chunks
    pub chunk_ids: Vec<ChunkId>,
}

/// A file left out of a directory ingest
#[derive(Debug, Serialize)]
pub struct SkippedFile {
    /// File that was skipped
    pub path: PathBuf,
    /// Why it was skipped
    pub reason: String,
}

/// Result of a directory ingest
#[derive(Debug, Default, Serialize)]
pub struct DirectorySummary {
    /// Documents indexed, one per file
    pub ingested: Vec<IngestSummary>,
    /// Files left out
    pub skipped: Vec<SkippedFile>,
    /// Chunks committed across all files
    pub chunks_added: usize,
}

/// Result of a delete command
#[derive(Debug, Serialize)]
pub struct DeleteSummary {
    /// What was deleted
    pub scope: String,
    /// Chunks removed
    pub removed: usize,
}

/// Result of a provider check
#[derive(Debug, Serialize)]
pub struct CheckSummary {
    /// Whether the provider answered
    pub available: bool,
    /// Index directory in use
    pub storage_dir: PathBuf,
}

/// Composition root: one manager, one retriever, handed to every command.
pub struct Docket {
    manager: Arc<IndexManager<Provider>>,
    retriever: Retriever<Provider>,
    storage_dir: PathBuf,
    ingest: IngestConfig,
}

impl Docket {
    /// Build the provider stack, index manager and retriever from `config`
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid
    pub fn from_config(config: &DocketConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let provider = ResilientProvider::new(
            ConfiguredProvider::from_config(&config.embedding),
            config.retry,
            config.embedding.batch_size,
        );
        let manager = Arc::new(IndexManager::new(provider, config)?);
        let retriever = Retriever::new(Arc::clone(&manager), config.retrieval);

        Ok(Self {
            manager,
            retriever,
            storage_dir: config.index.storage_dir.clone(),
            ingest: config.ingest,
        })
    }

    /// Read a text file and index it as one document
    ///
    /// # Errors
    /// Returns an error if the file is too large, cannot be read, or indexing fails
    pub async fn ingest(
        &self,
        document: &str,
        path: &Path,
        collection: Option<&str>,
    ) -> Result<IngestSummary> {
        if let Some(reason) = self.oversize_reason(path).await? {
            anyhow::bail!("{}: {reason}", path.display());
        }
        let source = read_source(document, path, collection).await?;
        let summary = self.index_source(source).await?;
        self.manager.flush().await?;
        Ok(summary)
    }

    /// Index every `.txt` file directly inside `directory`, one `add` batch per
    /// file. Oversized and unreadable files are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed or indexing fails
    pub async fn ingest_dir(
        &self,
        directory: &Path,
        collection: Option<&str>,
    ) -> Result<DirectorySummary> {
        let files = text_files(directory).await?;
        info!("Found {} text files in {}", files.len(), directory.display());

        let mut summary = DirectorySummary::default();
        for path in files {
            let document = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned);
            let outcome = match (self.oversize_reason(&path).await?, document) {
                (Some(reason), _) => Err(reason),
                (None, None) => Err("file name is not valid UTF-8".to_owned()),
                (None, Some(document)) => read_source(&document, &path, collection)
                    .await
                    .map_err(|error| format!("{error:#}")),
            };

            match outcome {
                Ok(source) => {
                    let ingested = self.index_source(source).await?;
                    summary.chunks_added += ingested.chunks_added;
                    summary.ingested.push(ingested);
                }
                Err(reason) => {
                    warn!("  Skipping {}: {reason}", path.display());
                    summary.skipped.push(SkippedFile { path, reason });
                }
            }
        }

        self.manager.flush().await?;
        info!(
            "Indexed {} files ({} chunks), skipped {}",
            summary.ingested.len(),
            summary.chunks_added,
            summary.skipped.len()
        );
        Ok(summary)
    }

    async fn index_source(&self, source: SourceDocument) -> Result<IngestSummary> {
        info!(
            "Ingesting {} ({} pages, {} characters)",
            source.document_id,
            source.pages.len(),
            source.char_count()
        );
        let document = source.document_id.clone();
        let report = self.manager.add(vec![source]).await?;
        Ok(IngestSummary {
            document,
            chunks_added: report.chunks_added,
            chunk_ids: report.chunk_ids,
        })
    }

    /// Why `path` exceeds the size limit, if it does
    async fn oversize_reason(&self, path: &Path) -> Result<Option<String>> {
        let size = async_fs::metadata(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?
            .len();
        let limit = self.ingest.max_file_size_bytes();
        Ok((size > limit).then(|| {
            format!(
                "{size} bytes exceeds the {} MB limit",
                self.ingest.max_file_size_mb
            )
        }))
    }

    /// Retrieve passages for `query`
    ///
    /// # Errors
    /// Returns an error if embedding or search fails or times out
    pub async fn query(
        &self,
        query: &str,
        limit: Option<usize>,
        collection: Option<&str>,
    ) -> Result<Vec<RetrievedPassage>> {
        let collection_id = collection.map(CollectionId::from);
        let limit = limit.unwrap_or_else(|| self.retriever.default_k());
        let passages = self
            .retriever
            .retrieve(query, limit, collection_id.as_ref())
            .await?;
        info!("Retrieved {} passages", passages.len());
        Ok(passages)
    }

    /// Delete a document or a collection
    ///
    /// # Errors
    /// Returns an error if neither scope is given or the rebuild fails
    pub async fn delete(
        &self,
        document: Option<&str>,
        collection: Option<&str>,
    ) -> Result<DeleteSummary> {
        let scope = match (document, collection) {
            (Some(document_id), _) => DeleteScope::Document(DocumentId::from(document_id)),
            (None, Some(collection_id)) => {
                DeleteScope::Collection(CollectionId::from(collection_id))
            }
            (None, None) => anyhow::bail!("Specify a document or a collection to delete"),
        };

        let removed = self.manager.delete(scope.clone()).await?;
        self.manager.flush().await?;
        Ok(DeleteSummary {
            scope: scope.to_string(),
            removed,
        })
    }

    /// Index statistics
    ///
    /// # Errors
    /// Returns an error if the index cannot be loaded
    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(self.manager.stats().await?)
    }

    /// Check that the embedding provider is reachable
    ///
    /// # Errors
    /// Returns an error if the provider does not answer
    pub async fn check(&self) -> Result<CheckSummary> {
        self.manager
            .provider()
            .ensure_available()
            .await
            .context("Embedding provider is not available")?;
        Ok(CheckSummary {
            available: true,
            storage_dir: self.storage_dir.clone(),
        })
    }
}

/// Read `path` as one document; form feeds separate pages
async fn read_source(
    document: &str,
    path: &Path,
    collection: Option<&str>,
) -> Result<SourceDocument> {
    let text = async_fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let collection_id = collection.map(CollectionId::from);

    Ok(if text.contains(PAGE_BREAK) {
        SourceDocument::with_pages(document, collection_id, text.split(PAGE_BREAK))
    } else {
        SourceDocument::new(document, collection_id, text)
    })
}

/// Regular `.txt` files directly inside `directory`, sorted by path
async fn text_files(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = async_fs::read_dir(directory)
        .await
        .with_context(|| format!("Failed to list {}", directory.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_text = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("txt"));
        if is_text && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
