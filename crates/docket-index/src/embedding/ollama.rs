use core::fmt::Display;
use docket_core::{EmbeddingConfig, Error, Result};
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::GenerateEmbeddingsRequest;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{Embedding, EmbeddingProvider};

/// Ollama embedding client.
///
/// The model is resolved against the locally installed models on first use.
/// When the configured model is missing and a fallback is configured, the
/// fallback is used for the lifetime of the client.
pub struct OllamaEmbeddingClient {
    ollama: Ollama,
    model: String,
    fallback_model: Option<String>,
    active_model: OnceCell<String>,
}

impl OllamaEmbeddingClient {
    /// Create a client for the configured host, port and models
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            ollama: Ollama::new(config.host.clone(), config.port),
            model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
            active_model: OnceCell::new(),
        }
    }

    /// Configured primary model
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Configured fallback model
    pub fn fallback_model(&self) -> Option<&str> {
        self.fallback_model.as_deref()
    }

    /// Model in use, once resolved
    pub fn active_model(&self) -> Option<&str> {
        self.active_model.get().map(String::as_str)
    }

    async fn resolve_model(&self) -> Result<&str> {
        let model = self
            .active_model
            .get_or_try_init(|| async {
                let models = self.ollama.list_local_models().await.map_err(|error| {
                    Error::Provider(format!(
                        "Failed to connect to Ollama: {error}. Ensure Ollama is running (ollama serve)"
                    ))
                })?;
                let installed: Vec<String> = models.into_iter().map(|model| model.name).collect();
                select_model(&installed, &self.model, self.fallback_model.as_deref())
            })
            .await?;
        Ok(model.as_str())
    }

    fn map_error(&self, action: &str, error: impl Display) -> Error {
        let model = self.active_model().unwrap_or(&self.model);
        classify_failure(model, action, &error.to_string())
    }
}

/// Pick the primary model if installed, else the fallback.
fn select_model(installed: &[String], primary: &str, fallback: Option<&str>) -> Result<String> {
    let is_installed = |model: &str| installed.iter().any(|name| name.contains(model));

    if is_installed(primary) {
        info!("  Embedding model '{primary}' available");
        return Ok(primary.to_owned());
    }
    match fallback {
        Some(fallback) if is_installed(fallback) => {
            warn!("  Embedding model '{primary}' not found, falling back to '{fallback}'");
            Ok(fallback.to_owned())
        }
        Some(fallback) => Err(Error::Config(format!(
            "Neither embedding model '{primary}' nor fallback '{fallback}' found. Run: ollama pull {primary}"
        ))),
        None => Err(Error::Config(format!(
            "Embedding model '{primary}' not found. Run: ollama pull {primary}"
        ))),
    }
}

/// Map an Ollama failure message onto the error taxonomy.
fn classify_failure(model: &str, action: &str, message: &str) -> Error {
    let lowered = message.to_lowercase();
    if lowered.contains("429") || lowered.contains("rate limit") || lowered.contains("too many requests")
    {
        Error::RateLimited(format!("{action}: {message}"))
    } else if lowered.contains("model") && lowered.contains("not found") {
        Error::Config(format!(
            "Embedding model '{model}' not found. Run: ollama pull {model}"
        ))
    } else {
        Error::Provider(format!("{action} failed: {message}"))
    }
}

impl EmbeddingProvider for OllamaEmbeddingClient {
    async fn ensure_available(&self) -> Result<()> {
        self.resolve_model().await.map(|_| ())
    }

    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let model = self.resolve_model().await?;
        let request = GenerateEmbeddingsRequest::new(model.to_owned(), text.to_owned().into());

        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| self.map_error("Embedding generation", error))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("No embeddings returned".to_owned()))
    }

    async fn embed_many(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        let model = self.resolve_model().await?;
        let request = GenerateEmbeddingsRequest::new(model.to_owned(), texts.into());
        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| self.map_error("Batch embedding generation", error))?;

        if response.embeddings.len() != expected {
            return Err(Error::Provider(format!(
                "Requested {expected} embeddings but received {}",
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}
