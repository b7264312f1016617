// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caching wrapper around an embedding backend.
//!
//! Looks up each text by the 4-tuple (provider, model, key fingerprint,
//! content hash) and only sends cache misses to the wrapped backend. Hits
//! touch the entry's LRU position; inserts evict beyond the configured
//! capacity.

use std::sync::Arc;

use tracing::debug;

use recall_core::error::RecallError;
use recall_core::traits::EmbeddingBackend;
use recall_core::types::{EmbeddingInput, content_hash};
use recall_storage::queries::cache::{self, CacheKey};
use recall_storage::Database;

/// An embedding backend fronted by the persistent embedding cache.
pub struct CachedEmbedder {
    backend: Arc<dyn EmbeddingBackend>,
    db: Arc<Database>,
    max_entries: usize,
}

impl CachedEmbedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, db: Arc<Database>, max_entries: usize) -> Self {
        Self {
            backend,
            db,
            max_entries,
        }
    }

    pub fn provider_id(&self) -> &str {
        self.backend.provider_id()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn dimensions(&self) -> usize {
        self.backend.dimensions()
    }

    pub fn backend(&self) -> &Arc<dyn EmbeddingBackend> {
        &self.backend
    }

    fn key_for(&self, hash: &str) -> CacheKey {
        CacheKey {
            provider: self.backend.provider_id().to_string(),
            model: self.backend.model().to_string(),
            provider_key: self.backend.key_fingerprint().to_string(),
            content_hash: hash.to_string(),
        }
    }

    /// Embed `(content_hash, text)` pairs, serving hits from the cache and
    /// batching all misses into a single backend call.
    ///
    /// Returns one vector per input pair, in order.
    pub async fn embed_hashed(
        &self,
        items: &[(String, String)],
    ) -> Result<Vec<Vec<f32>>, RecallError> {
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; items.len()];
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();

        for (i, (hash, text)) in items.iter().enumerate() {
            match cache::lookup(&self.db, &self.key_for(hash)).await? {
                Some(vector) => vectors[i] = Some(vector),
                None => {
                    miss_indices.push(i);
                    miss_texts.push(text.clone());
                }
            }
        }

        let hits = items.len() - miss_indices.len();
        metrics::counter!("recall_embedding_cache_hits_total").increment(hits as u64);
        metrics::counter!("recall_embedding_cache_misses_total")
            .increment(miss_indices.len() as u64);
        debug!(hits, misses = miss_indices.len(), "embedding cache lookup");

        if !miss_texts.is_empty() {
            let output = self
                .backend
                .embed(EmbeddingInput { texts: miss_texts })
                .await?;
            if output.embeddings.len() != miss_indices.len() {
                return Err(RecallError::EmbeddingFailed {
                    message: format!(
                        "backend returned {} vectors for {} texts",
                        output.embeddings.len(),
                        miss_indices.len()
                    ),
                    source: None,
                });
            }
            for (slot, vector) in miss_indices.iter().zip(output.embeddings) {
                let (hash, _) = &items[*slot];
                cache::put(&self.db, &self.key_for(hash), &vector, self.max_entries).await?;
                vectors[*slot] = Some(vector);
            }
        }

        // Every slot is filled: hits above, misses just now.
        vectors
            .into_iter()
            .map(|v| v.ok_or_else(|| RecallError::Internal("embedding slot unfilled".to_string())))
            .collect()
    }

    /// Embed a single query string through the cache.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let hash = content_hash(text);
        let mut vectors = self
            .embed_hashed(&[(hash, text.to_string())])
            .await?;
        vectors
            .pop()
            .ok_or_else(|| RecallError::Internal("empty embedding result".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_test_utils::MockEmbedder;

    async fn test_db() -> Arc<Database> {
        Arc::new(Database::open_in_memory().await.unwrap())
    }

    fn pairs(texts: &[&str]) -> Vec<(String, String)> {
        texts
            .iter()
            .map(|t| (content_hash(t), t.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn second_pass_hits_cache_with_zero_backend_calls() {
        let backend = Arc::new(MockEmbedder::new());
        let cached = CachedEmbedder::new(backend.clone(), test_db().await, 100);

        let first = cached.embed_hashed(&pairs(&["a", "b"])).await.unwrap();
        assert_eq!(backend.call_count(), 1);

        let second = cached.embed_hashed(&pairs(&["a", "b"])).await.unwrap();
        assert_eq!(backend.call_count(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn only_misses_reach_the_backend() {
        let backend = Arc::new(MockEmbedder::new());
        let cached = CachedEmbedder::new(backend.clone(), test_db().await, 100);

        cached.embed_hashed(&pairs(&["a"])).await.unwrap();
        cached.embed_hashed(&pairs(&["a", "b", "c"])).await.unwrap();

        // "a" was cached, so the second call embeds only "b" and "c".
        assert_eq!(backend.texts_embedded(), 3);
    }

    #[tokio::test]
    async fn different_identity_does_not_share_entries() {
        let db = test_db().await;
        let first = Arc::new(MockEmbedder::with_identity("mock", "m1", "key-a"));
        let second = Arc::new(MockEmbedder::with_identity("mock", "m1", "key-b"));

        CachedEmbedder::new(first, db.clone(), 100)
            .embed_hashed(&pairs(&["a"]))
            .await
            .unwrap();

        let other = CachedEmbedder::new(second.clone(), db, 100);
        other.embed_hashed(&pairs(&["a"])).await.unwrap();
        assert_eq!(second.call_count(), 1);
    }

    #[tokio::test]
    async fn query_embedding_round_trips_through_cache() {
        let backend = Arc::new(MockEmbedder::new());
        let cached = CachedEmbedder::new(backend.clone(), test_db().await, 100);

        let v1 = cached.embed_query("where do we deploy").await.unwrap();
        let v2 = cached.embed_query("where do we deploy").await.unwrap();
        assert_eq!(v1, v2);
        assert_eq!(backend.call_count(), 1);
    }
}
