//! Embedding store and similarity search
//!
//! ```text
//! task text ──► EmbeddingCache ──(miss)──► EmbeddingProvider (OpenAI / local BGE)
//!                    │
//!                    ▼
//!             SimilaritySearch ──► VectorStore::nearest   (pgvector, fast path)
//!                    │
//!                    └──(error)──► brute-force cosine over catalog vectors
//! ```
//!
//! Providers distinguish queries from documents because retrieval models
//! like BGE embed the two asymmetrically. Catalog services are documents;
//! everything a caller says is a query.

mod cache;
#[cfg(feature = "local-embeddings")]
mod local;
mod openai;
mod search;
pub mod vector;

pub use cache::EmbeddingCache;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;
pub use openai::OpenAiEmbeddings;
pub use search::{SimilaritySearch, VectorCandidate};

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::MatcherResult;

/// Embedding vector type (matches pgvector dimension)
pub type Embedding = Vec<f32>;

/// Trait for text embedding services
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a caller query
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Batch embed caller queries in one request
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Batch embed catalog documents. Defaults to the query embedding.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.embed_batch(texts).await
    }

    /// Model identifier for storage
    fn model_name(&self) -> &str;

    /// Embedding dimension
    fn dimension(&self) -> usize;
}

/// One nearest-neighbour hit from a vector-capable store
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub code: String,
    pub similarity: f32,
}

/// Store able to run a native similarity query over service vectors
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top `k` services with similarity strictly above `min_similarity`, best first
    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> MatcherResult<Vec<VectorHit>>;

    /// Store name for logging
    fn name(&self) -> &str;
}

/// Build the provider selected by `EMBEDDING_BACKEND`
///
/// - `openai` (default): OpenAI embeddings API
/// - `local`: Candle BGE-small, requires the `local-embeddings` feature
pub fn create_embedding_provider() -> Result<Arc<dyn EmbeddingProvider>> {
    let backend = std::env::var("EMBEDDING_BACKEND").unwrap_or_else(|_| "openai".to_string());
    let provider: Arc<dyn EmbeddingProvider> = match backend.trim().to_lowercase().as_str() {
        "openai" => Arc::new(OpenAiEmbeddings::from_env()?),
        #[cfg(feature = "local-embeddings")]
        "local" | "bge" => Arc::new(LocalEmbedder::new()?),
        #[cfg(not(feature = "local-embeddings"))]
        "local" | "bge" => {
            return Err(anyhow!(
                "EMBEDDING_BACKEND=local requires the local-embeddings feature"
            ))
        }
        other => {
            return Err(anyhow!(
                "Unknown EMBEDDING_BACKEND '{}'. Valid values: openai, local",
                other
            ))
        }
    };
    tracing::info!(model = provider.model_name(), "Embedding provider ready");
    Ok(provider)
}
