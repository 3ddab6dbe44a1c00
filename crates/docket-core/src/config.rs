//! Configuration for storage, chunking, embedding, retry and retrieval settings.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete docket configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocketConfig {
    /// Index storage configuration
    pub index: IndexConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,
    /// Retry and timeout policy for provider calls
    pub retry: RetryConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Limits applied when ingesting files
    pub ingest: IngestConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// When index state is written to disk after a mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Persist before publishing the new state; failures roll the batch back
    #[default]
    Sync,
    /// Publish immediately and persist in a background task
    Background,
}

/// Index storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the persisted companion artifacts
    pub storage_dir: PathBuf,
    /// Persistence strategy after add/delete
    pub persist_mode: PersistMode,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("index"),
            persist_mode: PersistMode::Sync,
        }
    }
}

/// Chunking configuration, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// Checks that the overlap leaves room for progress.
    ///
    /// # Errors
    /// Returns a configuration error if `chunk_size` is zero or `chunk_overlap >= chunk_size`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".to_owned()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Which embedding backend to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Ollama embedding endpoint
    #[default]
    Ollama,
    /// Offline feature-hashing embeddings
    Hashing,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend to use
    pub provider: ProviderKind,
    /// Embedding model name
    pub model: String,
    /// Model used when `model` is not installed
    pub fallback_model: Option<String>,
    /// Ollama host URL
    pub host: String,
    /// Ollama port
    pub port: u16,
    /// Texts sent per embedding request
    pub batch_size: usize,
    /// Vector dimension of the hashing provider
    pub hashing_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: "all-minilm".to_owned(),
            fallback_model: None,
            host: "http://localhost:11434".to_owned(),
            port: 11434,
            batch_size: 32,
            hashing_dimension: 384,
        }
    }
}

/// Retry and timeout policy for embedding calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// Backoff before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound on a single backoff in milliseconds
    pub max_backoff_ms: u64,
    /// Time budget of a single provider request in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
            request_timeout_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Backoff to wait after the given failed attempt (zero-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Time budget of a single provider request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages returned when the caller does not specify `k`
    pub default_k: usize,
    /// Multiplier applied to `k` when results are filtered by collection
    pub collection_oversample: usize,
    /// Time budget of a whole retrieval in milliseconds
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            collection_oversample: 4,
            timeout_ms: 10_000,
        }
    }
}

impl RetrievalConfig {
    /// Time budget of a whole retrieval
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Limits applied when ingesting files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Files larger than this are skipped by directory ingestion
    pub max_file_size_mb: u64,
    /// Chunks indexed per document; later chunks are dropped
    pub max_chunks_per_document: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 10,
            max_chunks_per_document: 2000,
        }
    }
}

impl IngestConfig {
    /// Largest accepted file in bytes
    pub const fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for docket crates when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl DocketConfig {
    /// Get the default config directory path (`~/.docket`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        use dirs::home_dir;
        let home = home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".docket"))
    }

    /// Get the default config file path (`~/.docket/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from a file, falling back to defaults when it does not exist
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        use toml::from_str;
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = from_str(&contents)?;

        tracing::debug!(
            "Loaded config from {}: storage_dir={}, provider={:?}",
            path.display(),
            config.index.storage_dir.display(),
            config.embedding.provider
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        use toml::to_string_pretty;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = to_string_pretty(self)
            .map_err(|error| Error::Serialization(format!("Failed to serialize config: {error}")))?;

        let header = "# Docket Configuration File\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))?;

        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognised keys: `DOCKET_INDEX_DIR`, `OLLAMA_HOST`, `DOCKET_LOG`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DOCKET_INDEX_DIR") {
            self.index.storage_dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.embedding.host = host;
        }
        if let Some(level) = lookup("DOCKET_LOG") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration, creating the storage directory if needed.
    ///
    /// # Errors
    /// Returns a configuration error for invalid chunking, batching or retry settings,
    /// or when the storage path cannot be used as a directory
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.embedding.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than zero".to_owned()));
        }
        if self.ingest.max_chunks_per_document == 0 {
            return Err(Error::Config(
                "max_chunks_per_document must be greater than zero".to_owned(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least one".to_owned()));
        }
        if self.embedding.provider == ProviderKind::Hashing && self.embedding.hashing_dimension == 0
        {
            return Err(Error::Config(
                "hashing_dimension must be greater than zero".to_owned(),
            ));
        }

        let storage = &self.index.storage_dir;
        if storage.is_file() {
            return Err(Error::Config(format!(
                "storage_dir {} is a file, expected a directory",
                storage.display()
            )));
        }
        fs::create_dir_all(storage).map_err(|error| {
            Error::Config(format!(
                "storage_dir {} is not usable: {error}",
                storage.display()
            ))
        })?;

        Ok(())
    }
}
