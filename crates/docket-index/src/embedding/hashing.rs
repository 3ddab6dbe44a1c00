use docket_core::Result;

use super::{Embedding, EmbeddingProvider};
use crate::vector_index::l2_normalize;

/// 64-bit FNV-1a offset basis
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
/// 64-bit FNV-1a prime
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Offline embedding provider using signed feature hashing of word tokens.
///
/// Tokens are hashed with FNV-1a, so vectors are stable across runs and
/// toolchain versions and an index persisted with this provider stays
/// queryable. Texts sharing vocabulary score higher than
/// unrelated texts, which is enough for local use and tests without a model
/// server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing vectors of `dimension` components
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Output dimension
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed synchronously
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0; self.dimension.max(1)];
        let buckets = vector.len() as u64;

        for token in text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % buckets) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// FNV-1a over `bytes`
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_text(text))
    }

    async fn embed_many(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
