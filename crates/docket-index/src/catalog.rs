//! Ordered chunk metadata kept parallel to the vector index.

use serde::{Deserialize, Serialize};

use docket_core::{ChunkId, ChunkRecord, Error, Result};

/// Append-only list of chunk records indexed by vector position.
///
/// Also owns the chunk id counter, so ids survive deletion and are never reused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCatalog {
    /// Format version of the persisted catalog
    version: u32,
    /// Next id to hand out
    next_chunk_id: ChunkId,
    /// Records in vector insertion order
    entries: Vec<ChunkRecord>,
}

impl ChunkCatalog {
    /// Catalog format version
    pub const VERSION: u32 = 1;

    /// Create an empty catalog
    pub fn new() -> Self {
        Self::with_next_id(ChunkId::default())
    }

    /// Create an empty catalog that continues an existing id sequence
    pub fn with_next_id(next_chunk_id: ChunkId) -> Self {
        Self {
            version: Self::VERSION,
            next_chunk_id,
            entries: Vec::new(),
        }
    }

    /// Reserve the next chunk id
    pub fn allocate_id(&mut self) -> ChunkId {
        let id = self.next_chunk_id;
        self.next_chunk_id = id.next();
        id
    }

    /// Id the next allocation will return
    pub const fn next_chunk_id(&self) -> ChunkId {
        self.next_chunk_id
    }

    /// Append a record and return its position
    pub fn append(&mut self, record: ChunkRecord) -> usize {
        if record.chunk_id >= self.next_chunk_id {
            self.next_chunk_id = record.chunk_id.next();
        }
        self.entries.push(record);
        self.entries.len() - 1
    }

    /// Record at `position`
    pub fn get(&self, position: usize) -> Option<&ChunkRecord> {
        self.entries.get(position)
    }

    /// All records matching `predicate`, with their positions
    pub fn filter<P>(&self, predicate: P) -> Vec<(usize, &ChunkRecord)>
    where
        P: Fn(&ChunkRecord) -> bool,
    {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, record)| predicate(record))
            .collect()
    }

    /// Remove every record matching `predicate`, returning how many were removed
    pub fn remove_where<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(&ChunkRecord) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|record| !predicate(record));
        before - self.entries.len()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate records in position order
    pub fn iter(&self) -> impl Iterator<Item = &ChunkRecord> + '_ {
        self.entries.iter()
    }

    /// Encode the catalog as JSON
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a catalog produced by [`ChunkCatalog::serialize`]
    ///
    /// # Errors
    /// Returns `CorruptIndex` if the bytes are not a valid catalog of the current version
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let catalog: Self = serde_json::from_slice(bytes)
            .map_err(|error| Error::CorruptIndex(format!("Failed to decode catalog: {error}")))?;

        if catalog.version != Self::VERSION {
            return Err(Error::CorruptIndex(format!(
                "Unsupported catalog format version {}",
                catalog.version
            )));
        }
        if let Some(max_id) = catalog.entries.iter().map(|record| record.chunk_id).max()
            && max_id >= catalog.next_chunk_id
        {
            return Err(Error::CorruptIndex(format!(
                "Chunk id {max_id} is not below the id counter {}",
                catalog.next_chunk_id
            )));
        }

        Ok(catalog)
    }
}
