//! Nearest-neighbour search over catalog vectors

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::vector::cosine_similarity;
use super::{EmbeddingCache, VectorStore};
use crate::config::MatcherConfig;
use crate::error::MatcherResult;
use crate::types::Service;

/// A service close to the input in embedding space
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorCandidate {
    pub service: Service,
    pub similarity: f32,
}

/// Embeds the input and finds the closest services.
///
/// The native store query is tried first. Any error there falls back to a
/// brute-force cosine scan over the vectors carried by the catalog snapshot.
pub struct SimilaritySearch {
    cache: Arc<EmbeddingCache>,
    store: Option<Arc<dyn VectorStore>>,
    top_k: usize,
    min_similarity: f32,
}

impl SimilaritySearch {
    pub fn new(cache: Arc<EmbeddingCache>, store: Option<Arc<dyn VectorStore>>) -> Self {
        Self::with_config(cache, store, &MatcherConfig::default())
    }

    pub fn with_config(
        cache: Arc<EmbeddingCache>,
        store: Option<Arc<dyn VectorStore>>,
        config: &MatcherConfig,
    ) -> Self {
        Self {
            cache,
            store,
            top_k: config.vector_top_k,
            min_similarity: config.vector_min_similarity,
        }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Candidates with similarity strictly above the floor, best first, at most `top_k`
    pub async fn candidates(
        &self,
        text: &str,
        services: &[Service],
    ) -> MatcherResult<Vec<VectorCandidate>> {
        let query = self.cache.embed(text).await?;

        if let Some(store) = &self.store {
            match store
                .nearest(&query, self.top_k, self.min_similarity)
                .await
            {
                Ok(hits) => {
                    let candidates = self.resolve_hits(hits, services);
                    debug!(
                        store = store.name(),
                        count = candidates.len(),
                        "Native vector search"
                    );
                    return Ok(candidates);
                }
                Err(e) => {
                    warn!(
                        store = store.name(),
                        error = %e,
                        "Native vector search failed, falling back to in-process cosine"
                    );
                }
            }
        }

        Ok(self.brute_force(&query, services))
    }

    /// Map store hits onto the current snapshot. Codes no longer active are dropped.
    fn resolve_hits(
        &self,
        hits: Vec<super::VectorHit>,
        services: &[Service],
    ) -> Vec<VectorCandidate> {
        let mut candidates: Vec<VectorCandidate> = hits
            .into_iter()
            .filter(|hit| hit.similarity > self.min_similarity)
            .filter_map(|hit| {
                services
                    .iter()
                    .find(|s| s.code == hit.code)
                    .map(|service| VectorCandidate {
                        service: service.clone(),
                        similarity: hit.similarity,
                    })
            })
            .collect();
        sort_desc(&mut candidates);
        candidates.truncate(self.top_k);
        candidates
    }

    fn brute_force(&self, query: &[f32], services: &[Service]) -> Vec<VectorCandidate> {
        let mut candidates: Vec<VectorCandidate> = services
            .iter()
            .filter_map(|service| {
                let embedding = service.embedding.as_deref()?;
                let similarity = cosine_similarity(query, embedding)?;
                (similarity > self.min_similarity).then(|| VectorCandidate {
                    service: service.clone(),
                    similarity,
                })
            })
            .collect();
        sort_desc(&mut candidates);
        candidates.truncate(self.top_k);
        debug!(count = candidates.len(), "Brute-force vector search");
        candidates
    }
}

/// Stable sort, so equal similarities keep catalog order
fn sort_desc(candidates: &mut [VectorCandidate]) {
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedding, EmbeddingProvider, VectorHit};
    use crate::error::MatcherError;
    use anyhow::Result;
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding> {
            Ok(self.0.clone())
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }
    }

    struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        async fn nearest(&self, _: &[f32], _: usize, _: f32) -> MatcherResult<Vec<VectorHit>> {
            Err(MatcherError::VectorSearch("connection refused".into()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    struct StaticStore(Vec<VectorHit>);

    #[async_trait]
    impl VectorStore for StaticStore {
        async fn nearest(&self, _: &[f32], _: usize, _: f32) -> MatcherResult<Vec<VectorHit>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn service(code: &str, embedding: Option<Vec<f32>>) -> Service {
        Service {
            code: code.to_string(),
            name: code.to_string(),
            description: String::new(),
            price: Decimal::new(5000, 2),
            estimated_minutes: 30,
            keywords: vec![],
            negative_keywords: vec![],
            embedding,
            category: "general".to_string(),
            is_active: true,
        }
    }

    fn search(store: Option<Arc<dyn VectorStore>>) -> SimilaritySearch {
        let cache = Arc::new(EmbeddingCache::new(Arc::new(FixedEmbedder(vec![1.0, 0.0]))));
        SimilaritySearch::new(cache, store)
    }

    #[tokio::test]
    async fn test_brute_force_filters_and_sorts() {
        let services = vec![
            service("FAR", Some(vec![0.0, 1.0])),
            service("NEAR", Some(vec![1.0, 0.1])),
            service("MID", Some(vec![1.0, 1.0])),
            service("NONE", None),
        ];

        let found = search(None).candidates("dripping tap", &services).await.unwrap();
        let codes: Vec<_> = found.iter().map(|c| c.service.code.as_str()).collect();

        assert_eq!(codes, vec!["NEAR", "MID"]);
        assert!(found[0].similarity > found[1].similarity);
    }

    #[tokio::test]
    async fn test_store_error_falls_back() {
        let services = vec![service("NEAR", Some(vec![1.0, 0.0]))];
        let found = search(Some(Arc::new(DownStore)))
            .candidates("dripping tap", &services)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_store_hits_resolved_against_snapshot() {
        let services = vec![service("TAP", None)];
        let store = StaticStore(vec![
            VectorHit { code: "GONE".into(), similarity: 0.95 },
            VectorHit { code: "TAP".into(), similarity: 0.91 },
            VectorHit { code: "TAP".into(), similarity: 0.60 },
        ]);
        let found = search(Some(Arc::new(store)))
            .candidates("dripping tap", &services)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].service.code, "TAP");
    }
}
