//! Batch embedding resolution.
//!
//! Words are resolved in contiguous chunks: every word of a chunk is
//! requested concurrently and the chunk completes when all of them have
//! returned. Chunks run one after another, so at most `batch_size` provider
//! calls are in flight. A single failure fails the whole call.

use std::sync::Arc;

use futures::future::try_join_all;

use super::cache::{Embedding, EmbeddingCache};
use super::embeddings::{EmbeddingError, EmbeddingProvider};

/// Errors produced while resolving words to vectors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to embed '{word}': {source}")]
    Provider {
        word: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("embedding for '{word}' has {got} dimensions, expected {expected}")]
    DimensionMismatch {
        word: String,
        expected: usize,
        got: usize,
    },

    #[error("batch size must be at least 1")]
    InvalidBatchSize,
}

/// Resolves words through the shared cache and the embedding provider.
pub struct BatchResolver {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl BatchResolver {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            cache: EmbeddingCache::new(),
        }
    }

    /// Resolve a single word.
    pub async fn resolve(&self, word: &str) -> Result<Embedding, ResolveError> {
        self.cache
            .get_or_resolve(word, self.provider.as_ref())
            .await
            .map_err(|source| ResolveError::Provider {
                word: word.to_string(),
                source,
            })
    }

    /// Resolve `words` in order, `batch_size` at a time.
    ///
    /// The returned vectors are index-aligned with `words` and share one
    /// dimensionality.
    pub async fn resolve_many<S: AsRef<str>>(
        &self,
        words: &[S],
        batch_size: usize,
    ) -> Result<Vec<Embedding>, ResolveError> {
        if batch_size == 0 {
            return Err(ResolveError::InvalidBatchSize);
        }

        let mut vectors = Vec::with_capacity(words.len());

        for (batch_idx, chunk) in words.chunks(batch_size).enumerate() {
            log::trace!("resolving batch #{batch_idx} ({} words)", chunk.len());
            let resolved = try_join_all(chunk.iter().map(|w| self.resolve(w.as_ref()))).await?;
            vectors.extend(resolved);
        }

        if let Some(first) = vectors.first() {
            let expected = first.len();
            if let Some((idx, bad)) = vectors
                .iter()
                .enumerate()
                .find(|(_, v)| v.len() != expected)
            {
                return Err(ResolveError::DimensionMismatch {
                    word: words[idx].as_ref().to_string(),
                    expected,
                    got: bad.len(),
                });
            }
        }

        Ok(vectors)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Number of distinct texts resolved so far in this session.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
