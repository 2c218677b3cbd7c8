//! Session-wide embedding cache.
//!
//! Keys are normalized text (trimmed, lower-cased). Entries are write-once and
//! never evicted. Two tasks resolving the same uncached key concurrently both
//! call the provider; the first one to store wins and both callers get the
//! stored vector.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::embeddings::{EmbeddingError, EmbeddingProvider};

/// Shared, immutable embedding vector.
pub type Embedding = Arc<[f32]>;

/// Normalize text into a cache key.
pub fn normalize_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Memoizes provider lookups for the lifetime of a session.
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, Embedding>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached vector for `text`, asking `provider` on a miss.
    ///
    /// Provider failures propagate and leave no entry behind.
    pub async fn get_or_resolve(
        &self,
        text: &str,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Embedding, EmbeddingError> {
        let key = normalize_key(text);

        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let vector: Embedding = provider.embed(&key).await?.into();
        Ok(self.insert_first(key, vector))
    }

    /// Lookup by already-normalized key.
    pub fn get(&self, key: &str) -> Option<Embedding> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    /// Store `vector` unless another writer got there first; returns the
    /// stored vector either way.
    fn insert_first(&self, key: String, vector: Embedding) -> Embedding {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.entry(key).or_insert(vector).clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}
