//! Process-wide embedding cache keyed by normalized text

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::vector::is_usable;
use super::{Embedding, EmbeddingProvider};
use crate::error::{MatcherError, MatcherResult};
use crate::text::normalize;

/// Cached wrapper around an [`EmbeddingProvider`].
///
/// Entries never expire. Only complete, finite, non-zero vectors are
/// written, so a failed or partial response can never poison a key.
/// Concurrent writers for the same key compute the same value, so the
/// last write simply wins.
pub struct EmbeddingCache {
    provider: Arc<dyn EmbeddingProvider>,
    entries: RwLock<HashMap<String, Arc<Embedding>>>,
}

impl EmbeddingCache {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Vector for `text`, calling the provider only on a miss
    pub async fn embed(&self, text: &str) -> MatcherResult<Arc<Embedding>> {
        let key = cache_key(text);
        if let Some(hit) = self.get_key(&key).await {
            debug!(key = %key, "Embedding cache hit");
            return Ok(hit);
        }

        let embedding = self
            .provider
            .embed(&key)
            .await
            .map_err(|e| MatcherError::Embedding(e.to_string()))?;

        if !is_usable(&embedding) {
            return Err(MatcherError::Embedding(format!(
                "provider {} returned an unusable vector",
                self.provider.model_name()
            )));
        }

        Ok(self.insert(key, embedding).await)
    }

    /// Warm the cache for several texts at once.
    ///
    /// More than one miss goes out as a single batch request. If the batch
    /// fails, each miss is retried on its own, concurrently. Returns how many
    /// new entries were written.
    pub async fn prefetch(&self, texts: &[&str]) -> usize {
        let misses = self.misses(texts).await;
        match misses.len() {
            0 => 0,
            1 => match self.embed(&misses[0]).await {
                Ok(_) => 1,
                Err(e) => {
                    warn!(error = %e, "Single embedding prefetch failed");
                    0
                }
            },
            _ => self.prefetch_batch(&misses).await,
        }
    }

    /// Vectors for several texts, in input order. Failures are `None`.
    pub async fn embed_many(&self, texts: &[&str]) -> Vec<Option<Arc<Embedding>>> {
        self.prefetch(texts).await;
        let entries = self.entries.read().await;
        texts
            .iter()
            .map(|t| entries.get(&cache_key(t)).cloned())
            .collect()
    }

    /// Cached vector for `text`, without calling the provider
    pub async fn get(&self, text: &str) -> Option<Arc<Embedding>> {
        self.get_key(&cache_key(text)).await
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn get_key(&self, key: &str) -> Option<Arc<Embedding>> {
        self.entries.read().await.get(key).cloned()
    }

    async fn insert(&self, key: String, embedding: Embedding) -> Arc<Embedding> {
        let embedding = Arc::new(embedding);
        self.entries
            .write()
            .await
            .insert(key, Arc::clone(&embedding));
        embedding
    }

    /// Distinct uncached keys, first-seen order
    async fn misses(&self, texts: &[&str]) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut misses: Vec<String> = Vec::new();
        for key in texts.iter().map(|t| cache_key(t)) {
            if !entries.contains_key(&key) && !misses.contains(&key) {
                misses.push(key);
            }
        }
        misses
    }

    async fn prefetch_batch(&self, misses: &[String]) -> usize {
        let refs: Vec<&str> = misses.iter().map(String::as_str).collect();
        match self.provider.embed_batch(&refs).await {
            Ok(vectors) if vectors.len() == misses.len() => {
                let mut written = 0;
                for (key, vector) in misses.iter().zip(vectors) {
                    if is_usable(&vector) {
                        self.insert(key.clone(), vector).await;
                        written += 1;
                    }
                }
                debug!(requested = misses.len(), written, "Batch embedding prefetch");
                written
            }
            Ok(vectors) => {
                warn!(
                    requested = misses.len(),
                    returned = vectors.len(),
                    "Embedding batch size mismatch, falling back to per-text calls"
                );
                self.prefetch_each(misses).await
            }
            Err(e) => {
                warn!(error = %e, "Embedding batch failed, falling back to per-text calls");
                self.prefetch_each(misses).await
            }
        }
    }

    async fn prefetch_each(&self, misses: &[String]) -> usize {
        let results = join_all(misses.iter().map(|key| self.embed(key))).await;
        results.iter().filter(|r| r.is_ok()).count()
    }
}

/// Cache key: normalized text, or the trimmed text if normalization empties it
fn cache_key(text: &str) -> String {
    let normalized = normalize(text);
    if normalized.is_empty() {
        text.trim().to_string()
    } else {
        normalized
    }
}
