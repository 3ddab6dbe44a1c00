use serde::{Deserialize, Serialize};

use crate::ids::{ChunkId, CollectionId, DocumentId};

/// Extracted text of one page (or of a whole document when pages are unknown).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// One-based page number, when the extractor knows it
    pub page: Option<u32>,
    /// Plain extracted text
    pub text: String,
}

/// Plain-text document handed over by the extraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Owning document id
    pub document_id: DocumentId,
    /// Optional collection scope
    pub collection_id: Option<CollectionId>,
    /// Page texts in reading order
    pub pages: Vec<PageText>,
}

impl SourceDocument {
    /// Creates a document from a single block of text without page information.
    pub fn new<T: Into<String>>(
        document_id: impl Into<DocumentId>,
        collection_id: Option<CollectionId>,
        text: T,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            collection_id,
            pages: vec![PageText {
                page: None,
                text: text.into(),
            }],
        }
    }

    /// Creates a document from numbered pages, numbering from one.
    pub fn with_pages<I, T>(
        document_id: impl Into<DocumentId>,
        collection_id: Option<CollectionId>,
        pages: I,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            document_id: document_id.into(),
            collection_id,
            pages: pages
                .into_iter()
                .zip(1_u32..)
                .map(|(text, page)| PageText {
                    page: Some(page),
                    text: text.into(),
                })
                .collect(),
        }
    }

    /// Total characters across all pages
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|page| page.text.chars().count()).sum()
    }
}

/// Fixed metadata record stored in the chunk catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable chunk identifier
    pub chunk_id: ChunkId,
    /// Document the chunk was cut from
    pub source_document_id: DocumentId,
    /// Collection scope of the owning document
    pub collection_id: Option<CollectionId>,
    /// Page the chunk starts on
    pub page: Option<u32>,
    /// Byte offset of the chunk within its page text
    pub offset: usize,
    /// Position of the chunk within its document
    pub chunk_index: u32,
    /// Number of chunks produced for the document
    pub total_chunks: u32,
    /// Raw chunk text
    pub text: String,
    /// Whether this is the placeholder chunk of an otherwise empty index
    #[serde(default)]
    pub is_sentinel: bool,
}

impl ChunkRecord {
    /// Text of the placeholder chunk
    pub const SENTINEL_TEXT: &'static str = "Welcome to LegalDoc. Upload documents to get started. Please upload a document to analyze.";

    /// Builds the placeholder chunk with the given id.
    pub fn sentinel(chunk_id: ChunkId) -> Self {
        Self {
            chunk_id,
            source_document_id: DocumentId::new(DocumentId::SYSTEM),
            collection_id: None,
            page: None,
            offset: 0,
            chunk_index: 0,
            total_chunks: 1,
            text: Self::SENTINEL_TEXT.to_owned(),
            is_sentinel: true,
        }
    }

    /// Collection name used for statistics, `default` when unscoped
    pub fn collection_name(&self) -> &str {
        self.collection_id
            .as_ref()
            .map_or(CollectionId::DEFAULT, CollectionId::as_str)
    }
}

/// A hydrated search hit returned to the query layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Chunk the passage came from
    pub chunk_id: ChunkId,
    /// Passage text
    pub text: String,
    /// Owning document
    pub source_document_id: DocumentId,
    /// Collection of the owning document
    pub collection_id: Option<CollectionId>,
    /// Page for citation
    pub page: Option<u32>,
    /// Cosine similarity to the query
    pub score: f32,
}

impl RetrievedPassage {
    /// Hydrates a passage from its catalog record and search score.
    pub fn from_record(record: &ChunkRecord, score: f32) -> Self {
        Self {
            chunk_id: record.chunk_id,
            text: record.text.clone(),
            source_document_id: record.source_document_id.clone(),
            collection_id: record.collection_id.clone(),
            page: record.page,
            score,
        }
    }
}
