//! Embedding provider boundary.
//!
//! The index depends on [`EmbeddingProvider`] only. Concrete backends are the
//! Ollama client and an offline hashing provider; [`ResilientProvider`] adds
//! timeouts, retry with backoff, normalisation and the dimension guard on top
//! of either.

mod hashing;
mod ollama;
mod resilient;

pub use hashing::HashingEmbeddingProvider;
pub use ollama::OllamaEmbeddingClient;
pub use resilient::ResilientProvider;

use docket_core::{EmbeddingConfig, ProviderKind, Result};
use std::future::Future;

/// A single embedding vector
pub type Embedding = Vec<f32>;

/// Trait for generating embeddings from text
pub trait EmbeddingProvider: Send + Sync {
    /// Ensure the embedding model is reachable and loaded
    ///
    /// # Errors
    /// Returns an error if the model is not available
    fn ensure_available(&self) -> impl Future<Output = Result<()>> + Send;

    /// Generate the embedding of one text
    ///
    /// # Errors
    /// Returns an error if embedding generation fails
    fn embed_one(&self, text: &str) -> impl Future<Output = Result<Embedding>> + Send;

    /// Generate embeddings for several texts, in input order
    ///
    /// # Errors
    /// Returns an error if any embedding generation fails
    fn embed_many(
        &self,
        texts: Vec<String>,
    ) -> impl Future<Output = Result<Vec<Embedding>>> + Send;
}

/// Provider selected at runtime from configuration.
pub enum ConfiguredProvider {
    /// Ollama embedding endpoint
    Ollama(OllamaEmbeddingClient),
    /// Offline feature hashing
    Hashing(HashingEmbeddingProvider),
}

impl ConfiguredProvider {
    /// Build the provider named by `config`
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        match config.provider {
            ProviderKind::Ollama => Self::Ollama(OllamaEmbeddingClient::new(config)),
            ProviderKind::Hashing => {
                Self::Hashing(HashingEmbeddingProvider::new(config.hashing_dimension))
            }
        }
    }
}

impl EmbeddingProvider for ConfiguredProvider {
    async fn ensure_available(&self) -> Result<()> {
        match self {
            Self::Ollama(client) => client.ensure_available().await,
            Self::Hashing(provider) => provider.ensure_available().await,
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        match self {
            Self::Ollama(client) => client.embed_one(text).await,
            Self::Hashing(provider) => provider.embed_one(text).await,
        }
    }

    async fn embed_many(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        match self {
            Self::Ollama(client) => client.embed_many(texts).await,
            Self::Hashing(provider) => provider.embed_many(texts).await,
        }
    }
}
