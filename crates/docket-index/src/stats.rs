use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use docket_core::ChunkId;

use crate::catalog::ChunkCatalog;

/// Counters for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Indexed chunks
    pub chunk_count: usize,
    /// Distinct documents
    pub document_count: usize,
    /// Characters of chunk text, overlap included
    pub total_characters: usize,
}

/// Index-wide statistics. The sentinel is never counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Indexed chunks across all collections
    pub total_chunks: usize,
    /// Distinct documents across all collections
    pub total_documents: usize,
    /// Id the next chunk will receive
    pub next_chunk_id: ChunkId,
    /// Per-collection counters; unscoped documents are reported under the reserved `default` name
    pub collections: BTreeMap<String, CollectionStats>,
}

impl IndexStats {
    /// Compute statistics from a catalog
    pub fn from_catalog(catalog: &ChunkCatalog) -> Self {
        let mut collections: BTreeMap<String, CollectionStats> = BTreeMap::new();
        let mut documents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut all_documents = BTreeSet::new();

        for record in catalog.iter().filter(|record| !record.is_sentinel) {
            let name = record.collection_name();
            let entry = collections.entry(name.to_owned()).or_default();
            entry.chunk_count += 1;
            entry.total_characters += record.text.chars().count();
            documents
                .entry(name)
                .or_default()
                .insert(record.source_document_id.as_str());
            all_documents.insert(record.source_document_id.as_str());
        }

        for (name, members) in documents {
            if let Some(entry) = collections.get_mut(name) {
                entry.document_count = members.len();
            }
        }

        Self {
            total_chunks: collections.values().map(|stats| stats.chunk_count).sum(),
            total_documents: all_documents.len(),
            next_chunk_id: catalog.next_chunk_id(),
            collections,
        }
    }
}
