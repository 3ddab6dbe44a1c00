//! Query facade: embed, search, filter, hydrate.

use core::time::Duration;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

use docket_core::{CollectionId, Error, Result, RetrievalConfig, RetrievedPassage};

use crate::embedding::EmbeddingProvider;
use crate::manager::IndexManager;
use crate::snapshot::IndexSnapshot;

/// Ranked passage lookup over a shared [`IndexManager`].
pub struct Retriever<E> {
    manager: Arc<IndexManager<E>>,
    config: RetrievalConfig,
}

impl<E: EmbeddingProvider> Retriever<E> {
    /// Create a retriever sharing `manager` with the ingestion path
    pub const fn new(manager: Arc<IndexManager<E>>, config: RetrievalConfig) -> Self {
        Self { manager, config }
    }

    /// Shared index manager
    pub const fn manager(&self) -> &Arc<IndexManager<E>> {
        &self.manager
    }

    /// Passages returned when the caller has no preference
    pub const fn default_k(&self) -> usize {
        self.config.default_k
    }

    /// Up to `limit` passages most similar to `query`, best first, optionally
    /// restricted to one collection. An index holding only the sentinel yields
    /// an empty list.
    ///
    /// # Errors
    /// Returns provider errors, `Timeout` when the configured budget is
    /// exceeded, `DimensionMismatch`, or `IndexUnavailable`
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        collection: Option<&CollectionId>,
    ) -> Result<Vec<RetrievedPassage>> {
        self.retrieve_with_timeout(query, limit, collection, self.config.timeout())
            .await
    }

    /// As [`Self::retrieve`], bounded by `budget` instead of the configured timeout
    ///
    /// # Errors
    /// Returns the same errors as [`Self::retrieve`]
    pub async fn retrieve_with_timeout(
        &self,
        query: &str,
        limit: usize,
        collection: Option<&CollectionId>,
        budget: Duration,
    ) -> Result<Vec<RetrievedPassage>> {
        timeout(budget, self.lookup(query, limit, collection))
            .await
            .map_err(|_| Error::Timeout(format!("Retrieval exceeded {budget:?}")))?
    }

    /// As [`Self::retrieve`], but any failure is logged and reported as "nothing found"
    pub async fn retrieve_or_empty(
        &self,
        query: &str,
        limit: usize,
        collection: Option<&CollectionId>,
    ) -> Vec<RetrievedPassage> {
        match self.retrieve(query, limit, collection).await {
            Ok(passages) => passages,
            Err(error) => {
                warn!("Retrieval failed, returning no passages: {error}");
                Vec::new()
            }
        }
    }

    async fn lookup(
        &self,
        query: &str,
        limit: usize,
        collection: Option<&CollectionId>,
    ) -> Result<Vec<RetrievedPassage>> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.manager.snapshot().await?;
        if snapshot.real_len() == 0 {
            debug!("  Index holds no documents; skipping query embedding");
            return Ok(Vec::new());
        }

        let embedding = self.manager.provider().embed_one(query).await?;

        let wanted = if collection.is_some() {
            limit.saturating_mul(self.config.collection_oversample.max(1))
        } else {
            limit
        };
        let fetch = wanted.saturating_add(snapshot.sentinel_count());

        let mut passages = hydrate(&snapshot, &embedding, fetch, limit, collection)?;
        if passages.len() < limit && fetch < snapshot.len() {
            debug!(
                "  Oversampled search found {} of {limit}; widening to the full index",
                passages.len()
            );
            passages = hydrate(&snapshot, &embedding, snapshot.len(), limit, collection)?;
        }
        Ok(passages)
    }
}

/// Search `fetch` neighbours and keep the first `limit` real passages in scope.
fn hydrate(
    snapshot: &IndexSnapshot,
    embedding: &[f32],
    fetch: usize,
    limit: usize,
    collection: Option<&CollectionId>,
) -> Result<Vec<RetrievedPassage>> {
    let neighbors = snapshot.search(embedding, fetch)?;
    Ok(neighbors
        .into_iter()
        .filter_map(|neighbor| {
            snapshot
                .catalog()
                .get(neighbor.position)
                .map(|record| (record, neighbor.score))
        })
        .filter(|(record, _)| !record.is_sentinel)
        .filter(|(record, _)| {
            collection.is_none_or(|wanted| record.collection_id.as_ref() == Some(wanted))
        })
        .take(limit)
        .map(|(record, score)| RetrievedPassage::from_record(record, score))
        .collect())
}
