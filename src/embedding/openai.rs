//! OpenAI embeddings client

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{Embedding, EmbeddingProvider};

const API_URL: &str = "https://api.openai.com/v1/embeddings";

pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

impl OpenAiEmbeddings {
    /// Create embedder with default model (text-embedding-3-small)
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, "text-embedding-3-small".to_string(), 1536)
    }

    /// Create embedder with specific model
    pub fn with_model(api_key: String, model: String, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            dimension,
            base_url: API_URL.to_string(),
        }
    }

    /// Create from environment variables.
    ///
    /// `OPENAI_EMBEDDING_MODEL` and `OPENAI_EMBEDDING_DIM` override the defaults.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let mut embedder = Self::new(api_key);
        if let Ok(model) = std::env::var("OPENAI_EMBEDDING_MODEL") {
            embedder.model = model;
        }
        if let Ok(dim) = std::env::var("OPENAI_EMBEDDING_DIM") {
            embedder.dimension = dim
                .parse()
                .map_err(|e| anyhow!("OPENAI_EMBEDDING_DIM={:?}: {}", dim, e))?;
        }
        Ok(embedder)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request(&self, input: serde_json::Value) -> Result<Vec<Embedding>> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "input": input
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;

        // Sort by index to maintain order
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.request(serde_json::json!(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding in response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.request(serde_json::json!(texts)).await?;
        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Embedding batch returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            ));
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
