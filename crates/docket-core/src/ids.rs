use core::fmt;
use serde::{Deserialize, Serialize};

/// Identifier of a source document, opaque to the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Reserved document id owning the sentinel chunk
    pub const SYSTEM: &'static str = "system";

    /// Creates a document id from any string-like value
    pub fn new<T: Into<String>>(value: T) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved system document id
    pub fn is_system(&self) -> bool {
        self.0 == Self::SYSTEM
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Logical partition tag used to scope search and deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    /// Name reported for chunks that carry no collection; reserved
    pub const DEFAULT: &'static str = "default";

    /// Creates a collection id from any string-like value
    pub fn new<T: Into<String>>(value: T) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved name of the unscoped bucket
    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for CollectionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CollectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Chunk identifier, assigned once and never reused within an index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Wraps a raw identifier value
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw identifier value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The identifier that follows this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
