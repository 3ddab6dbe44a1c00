use docket_core::{Error, Result, RetryConfig};
use std::future::Future;
use std::sync::OnceLock;
use tokio::time::{sleep, timeout};
use tracing::warn;

use super::{Embedding, EmbeddingProvider};
use crate::vector_index::{is_finite, l2_normalize};

/// Wraps a provider with per-call timeouts, retry with exponential backoff,
/// batching, normalisation and a fixed output dimension.
///
/// The dimension is taken from the first successful call; any later vector of
/// another dimension fails the whole call with [`Error::DimensionMismatch`].
pub struct ResilientProvider<E> {
    inner: E,
    retry: RetryConfig,
    batch_size: usize,
    dimension: OnceLock<usize>,
}

impl<E: EmbeddingProvider> ResilientProvider<E> {
    /// Wrap `inner` with the given policy. A zero batch size is treated as one.
    pub fn new(inner: E, retry: RetryConfig, batch_size: usize) -> Self {
        Self {
            inner,
            retry,
            batch_size: batch_size.max(1),
            dimension: OnceLock::new(),
        }
    }

    /// Dimension fixed by the first successful call
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    /// Wrapped provider
    pub const fn inner(&self) -> &E {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, action: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let budget = self.retry.request_timeout();
        let mut attempt = 0;

        loop {
            let outcome = match timeout(budget, operation()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!("{action} exceeded {budget:?}"))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt + 1 < attempts => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        "  {action} failed (attempt {}/{attempts}): {error}; retrying in {backoff:?}",
                        attempt + 1
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn accept(&self, mut vector: Embedding) -> Result<Embedding> {
        let actual = vector.len();
        if actual == 0 {
            return Err(Error::Provider("Provider returned an empty embedding".to_owned()));
        }
        let expected = *self.dimension.get_or_init(|| actual);
        if expected != actual {
            warn!("  Rejecting embedding of dimension {actual}, expected {expected}");
            return Err(Error::DimensionMismatch { expected, actual });
        }
        if !is_finite(&vector) {
            warn!("  Rejecting embedding with non-finite components");
            return Err(Error::Provider(
                "Provider returned an embedding with non-finite components".to_owned(),
            ));
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

impl<E: EmbeddingProvider> EmbeddingProvider for ResilientProvider<E> {
    async fn ensure_available(&self) -> Result<()> {
        self.with_retry("Availability check", || self.inner.ensure_available())
            .await
    }

    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let vector = self
            .with_retry("Embedding", || self.inner.embed_one(text))
            .await?;
        self.accept(vector)
    }

    async fn embed_many(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self
                .with_retry("Batch embedding", || self.inner.embed_many(batch.to_vec()))
                .await?;
            if embedded.len() != batch.len() {
                return Err(Error::Provider(format!(
                    "Requested {} embeddings but received {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            for vector in embedded {
                vectors.push(self.accept(vector)?);
            }
        }
        Ok(vectors)
    }
}
