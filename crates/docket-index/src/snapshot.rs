use docket_core::{Error, Result};

use crate::catalog::ChunkCatalog;
use crate::vector_index::{Neighbor, VectorIndex};

/// Immutable vector index and catalog pair published to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    /// Publication counter, increasing with every swap
    revision: u64,
    /// Vectors in catalog order
    vectors: VectorIndex,
    /// Metadata in vector order
    catalog: ChunkCatalog,
}

impl IndexSnapshot {
    /// Pair a vector index with its catalog.
    ///
    /// # Errors
    /// Returns `CorruptIndex` if the two structures differ in length
    pub fn new(revision: u64, vectors: VectorIndex, catalog: ChunkCatalog) -> Result<Self> {
        if vectors.len() != catalog.len() {
            return Err(Error::CorruptIndex(format!(
                "Vector index holds {} entries but catalog holds {}",
                vectors.len(),
                catalog.len()
            )));
        }
        Ok(Self {
            revision,
            vectors,
            catalog,
        })
    }

    /// Publication counter
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Vector half of the pair
    pub const fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// Catalog half of the pair
    pub const fn catalog(&self) -> &ChunkCatalog {
        &self.catalog
    }

    /// Entries including the sentinel
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Whether the pair holds nothing at all
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Number of sentinel entries
    pub fn sentinel_count(&self) -> usize {
        self.catalog.iter().filter(|record| record.is_sentinel).count()
    }

    /// Entries that came from real documents
    pub fn real_len(&self) -> usize {
        self.len() - self.sentinel_count()
    }

    /// Nearest neighbours of `query`
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if the query dimension differs from the index
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        self.vectors.search(query, limit)
    }

    /// Split into owned parts for building the next revision
    pub fn to_parts(&self) -> (VectorIndex, ChunkCatalog) {
        (self.vectors.clone(), self.catalog.clone())
    }
}
