//! Paired on-disk persistence for the vector index and catalog.
//!
//! Every save writes both artifacts into a fresh generation directory, syncs
//! them, then replaces the `CURRENT` pointer with a temp-file rename. A loader
//! resolves the pointer first, so it only ever sees a complete pair.

use std::fs::{self, File};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs as async_fs;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use docket_core::{Error, Result};

use crate::catalog::ChunkCatalog;
use crate::snapshot::IndexSnapshot;
use crate::vector_index::VectorIndex;

/// Pointer file naming the live generation
pub const CURRENT_FILE: &str = "CURRENT";
/// Serialized vector index inside a generation
pub const VECTORS_FILE: &str = "vectors.bin";
/// Serialized catalog inside a generation
pub const CATALOG_FILE: &str = "catalog.json";
/// Prefix of generation directories
const GENERATION_PREFIX: &str = "gen-";

/// Storage location of one index instance.
#[derive(Debug)]
pub struct IndexStore {
    /// Directory holding the generations and the pointer
    root: PathBuf,
    /// Revision of the last snapshot written; serialises writers
    persisted: Mutex<Option<u64>>,
}

impl IndexStore {
    /// Create a store rooted at `root`. Nothing is touched until the first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            persisted: Mutex::new(None),
        }
    }

    /// Storage directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the live generation
    ///
    /// # Errors
    /// Returns `CorruptIndex` if no valid pointer exists
    pub async fn current_generation_dir(&self) -> Result<PathBuf> {
        let pointer = self.root.join(CURRENT_FILE);
        let contents = async_fs::read_to_string(&pointer).await.map_err(|error| {
            Error::CorruptIndex(format!(
                "No readable index pointer at {}: {error}",
                pointer.display()
            ))
        })?;
        let name = contents.trim();
        parse_generation(name).ok_or_else(|| {
            Error::CorruptIndex(format!("Index pointer names invalid generation '{name}'"))
        })?;
        Ok(self.root.join(name))
    }

    /// Load both artifacts of the live generation.
    ///
    /// # Errors
    /// Returns `CorruptIndex` if either artifact is missing or unreadable, or if
    /// their lengths disagree
    pub async fn load(&self) -> Result<(VectorIndex, ChunkCatalog)> {
        let generation = self.current_generation_dir().await?;
        let vectors_bytes = read_artifact(&generation.join(VECTORS_FILE)).await?;
        let catalog_bytes = read_artifact(&generation.join(CATALOG_FILE)).await?;

        let (vectors, catalog) = spawn_blocking(move || -> Result<_> {
            Ok((
                VectorIndex::deserialize(&vectors_bytes)?,
                ChunkCatalog::deserialize(&catalog_bytes)?,
            ))
        })
        .await
        .map_err(|error| Error::Other(format!("Task join error: {error}")))??;

        if vectors.len() != catalog.len() {
            return Err(Error::CorruptIndex(format!(
                "Vector index holds {} entries but catalog holds {}",
                vectors.len(),
                catalog.len()
            )));
        }

        debug!(
            "  Loaded {} entries from {}",
            catalog.len(),
            generation.display()
        );
        Ok((vectors, catalog))
    }

    /// Persist `snapshot` as a new generation.
    ///
    /// A snapshot older than the last one written is skipped, so background
    /// saves finishing out of order never roll the disk state back.
    ///
    /// # Errors
    /// Returns an error if encoding or any filesystem step fails; the previous
    /// generation stays live in that case
    pub async fn save(&self, snapshot: Arc<IndexSnapshot>) -> Result<()> {
        let mut persisted = self.persisted.lock().await;
        let revision = snapshot.revision();
        if persisted.is_some_and(|last| last >= revision) {
            debug!("  Skipping save of stale revision {revision}");
            return Ok(());
        }

        let root = self.root.clone();
        let generation = spawn_blocking(move || write_generation(&root, &snapshot))
            .await
            .map_err(|error| Error::Other(format!("Task join error: {error}")))??;

        *persisted = Some(revision);
        debug!(
            "  Saved revision {revision} to {}",
            generation.display()
        );
        Ok(())
    }
}

async fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    async_fs::read(path).await.map_err(|error| {
        Error::CorruptIndex(format!("Failed to read {}: {error}", path.display()))
    })
}

fn generation_name(generation: u64) -> String {
    format!("{GENERATION_PREFIX}{generation:06}")
}

fn parse_generation(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(GENERATION_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn read_current(root: &Path) -> Result<Option<u64>> {
    match fs::read_to_string(root.join(CURRENT_FILE)) {
        Ok(contents) => Ok(parse_generation(contents.trim())),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(Error::Io(error)),
    }
}

fn write_generation(root: &Path, snapshot: &IndexSnapshot) -> Result<PathBuf> {
    fs::create_dir_all(root)?;
    let previous = read_current(root)?;

    let mut generation = previous.map_or(1, |current| current + 1);
    while root.join(generation_name(generation)).exists() {
        generation += 1;
    }
    let name = generation_name(generation);
    let directory = root.join(&name);
    fs::create_dir(&directory)?;

    write_synced(
        &directory.join(VECTORS_FILE),
        &snapshot.vectors().serialize()?,
    )?;
    write_synced(
        &directory.join(CATALOG_FILE),
        &snapshot.catalog().serialize()?,
    )?;
    sync_directory(&directory);

    let temp_pointer = root.join(format!("{CURRENT_FILE}.tmp"));
    write_synced(&temp_pointer, name.as_bytes())?;
    fs::rename(&temp_pointer, root.join(CURRENT_FILE))?;
    sync_directory(root);

    prune_generations(root, generation, previous);
    Ok(directory)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn sync_directory(path: &Path) {
    if let Err(error) = File::open(path).and_then(|directory| directory.sync_all()) {
        debug!("  Directory sync skipped for {}: {error}", path.display());
    }
}

/// Remove generations other than the live one and the one it replaced.
fn prune_generations(root: &Path, live: u64, previous: Option<u64>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(generation) = file_name.to_str().and_then(parse_generation) else {
            continue;
        };
        if generation == live || Some(generation) == previous {
            continue;
        }
        if let Err(error) = fs::remove_dir_all(entry.path()) {
            warn!(
                "  Failed to prune old generation {}: {error}",
                entry.path().display()
            );
        }
    }
}
