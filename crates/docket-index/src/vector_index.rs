//! Exact nearest-neighbour index over fixed-dimension vectors.
//!
//! Vectors are L2-normalised on insertion so that the inner product equals
//! cosine similarity. Rows are stored in one contiguous buffer; positions are
//! append-only and map 1:1 onto catalog rows.

use bincode::config::standard as bincode_config;
use bincode::{Decode, Encode, decode_from_slice, encode_to_vec};
use core::cmp::Ordering;

use docket_core::{Error, Result};

/// A search hit: catalog position and cosine score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row position in the index
    pub position: usize,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Flat cosine-similarity index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    /// Dimension fixed by the first inserted vector
    dimension: Option<usize>,
    /// Row-major vector data
    data: Vec<f32>,
}

/// On-disk form of the index
#[derive(Debug, Encode, Decode)]
struct PersistedVectors {
    version: u32,
    dimension: Option<u64>,
    data: Vec<f32>,
}

impl PersistedVectors {
    const VERSION: u32 = 1;
}

impl VectorIndex {
    /// Create an empty index whose dimension is fixed by the first add
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index with a fixed dimension
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            data: Vec::new(),
        }
    }

    /// Dimension of stored vectors, if fixed
    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        match self.dimension {
            Some(dimension) if dimension > 0 => self.data.len() / dimension,
            _ => 0,
        }
    }

    /// Whether the index holds no vectors
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append vectors and return their positions.
    ///
    /// The batch is validated before anything is appended, so a rejected batch
    /// leaves the index unchanged.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if any vector differs from the index dimension,
    /// or an error for zero-length vectors and vectors with non-finite components
    pub fn add(&mut self, vectors: Vec<Vec<f32>>) -> Result<Vec<usize>> {
        let Some(first) = vectors.first() else {
            return Ok(Vec::new());
        };
        let expected = self.dimension.unwrap_or(first.len());
        if expected == 0 {
            return Err(Error::Other("Cannot index zero-length vectors".to_owned()));
        }
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(Error::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        if let Some(offset) = vectors.iter().position(|vector| !is_finite(vector)) {
            return Err(Error::Other(format!(
                "Vector {offset} of the batch has non-finite components"
            )));
        }

        self.dimension = Some(expected);
        let start = self.len();
        self.data.reserve(vectors.len() * expected);
        for mut vector in vectors {
            l2_normalize(&mut vector);
            self.data.extend_from_slice(&vector);
        }

        Ok((start..self.len()).collect())
    }

    /// Stored (normalised) vector at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let dimension = self.dimension?;
        let start = position.checked_mul(dimension)?;
        self.data.get(start..start + dimension)
    }

    /// Iterate over stored vectors in position order
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.dimension.unwrap_or(1).max(1))
    }

    /// Build a fresh index from the rows at `positions`, keeping their relative order.
    pub fn retain_positions(&self, positions: &[usize]) -> Self {
        let mut data = Vec::with_capacity(positions.len() * self.dimension.unwrap_or(0));
        for &position in positions {
            if let Some(row) = self.vector(position) {
                data.extend_from_slice(row);
            }
        }
        Self {
            dimension: self.dimension,
            data,
        }
    }

    /// Return at most `limit` nearest neighbours by cosine similarity.
    ///
    /// Ties are broken by ascending position. An empty index or `limit == 0`
    /// yields an empty list.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if the query dimension differs from the index dimension
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if self.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        if query.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        if !is_finite(query) {
            return Err(Error::Other("Query vector has non-finite components".to_owned()));
        }

        let mut normalized = query.to_vec();
        l2_normalize(&mut normalized);

        let mut scored: Vec<Neighbor> = self
            .rows()
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                score: dot(&normalized, row),
            })
            .collect();

        scored.sort_by(compare_neighbors);
        scored.truncate(limit);
        Ok(scored)
    }

    /// Encode the whole index
    ///
    /// # Errors
    /// Returns a serialization error if encoding fails
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let persisted = PersistedVectors {
            version: PersistedVectors::VERSION,
            dimension: self.dimension.map(|dimension| dimension as u64),
            data: self.data.clone(),
        };
        encode_to_vec(&persisted, bincode_config())
            .map_err(|error| Error::Serialization(format!("Failed to encode vectors: {error}")))
    }

    /// Decode an index produced by [`VectorIndex::serialize`]
    ///
    /// # Errors
    /// Returns `CorruptIndex` if the bytes are not a valid index of the current version
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (persisted, _): (PersistedVectors, usize) =
            decode_from_slice(bytes, bincode_config()).map_err(|error| {
                Error::CorruptIndex(format!("Failed to decode vectors: {error}"))
            })?;

        if persisted.version != PersistedVectors::VERSION {
            return Err(Error::CorruptIndex(format!(
                "Unsupported vector format version {}",
                persisted.version
            )));
        }

        let dimension = persisted.dimension.map(|dimension| dimension as usize);
        match dimension {
            Some(0) => Err(Error::CorruptIndex("Zero vector dimension".to_owned())),
            Some(dimension) if persisted.data.len() % dimension != 0 => {
                Err(Error::CorruptIndex(format!(
                    "Vector data length {} is not a multiple of dimension {dimension}",
                    persisted.data.len()
                )))
            }
            None if !persisted.data.is_empty() => Err(Error::CorruptIndex(
                "Vector data present without a dimension".to_owned(),
            )),
            _ if !is_finite(&persisted.data) => Err(Error::CorruptIndex(
                "Vector data has non-finite components".to_owned(),
            )),
            _ => Ok(Self {
                dimension,
                data: persisted.data,
            }),
        }
    }
}

/// Scale `vector` to unit length in place; zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|value| *value /= norm);
    }
}

/// Whether every component is a finite number
pub fn is_finite(vector: &[f32]) -> bool {
    vector.iter().all(|value| value.is_finite())
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(lhs, rhs)| lhs * rhs).sum()
}

/// Descending score, then ascending position
fn compare_neighbors(first: &Neighbor, second: &Neighbor) -> Ordering {
    second
        .score
        .total_cmp(&first.score)
        .then_with(|| first.position.cmp(&second.position))
}
