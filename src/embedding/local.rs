//! Local sentence embedding using Candle and BGE-small-en-v1.5
//!
//! BGE is retrieval-optimized (query→document), which suits matching an
//! informal caller description against formal service names:
//! - CLS token pooling, not mean pooling
//! - Query instruction prefix for asymmetric retrieval
//! - Output is L2 normalized, so cosine reduces to a dot product

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{Embedding, EmbeddingProvider};

/// BGE retrieval instruction prefix - apply to QUERIES ONLY, never documents
const QUERY_PREFIX: &str = "Represent this sentence for searching relevant passages: ";

/// Model repository on HuggingFace Hub
const MODEL_REPO: &str = "BAAI/bge-small-en-v1.5";

pub const EMBEDDING_DIM: usize = 384;

struct Model {
    bert: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// In-process embedder; inference runs on the blocking pool
#[derive(Clone)]
pub struct LocalEmbedder {
    model: Arc<Model>,
}

impl LocalEmbedder {
    /// Load the model, downloading it into the HuggingFace cache if needed
    pub fn new() -> Result<Self> {
        Self::with_model(MODEL_REPO)
    }

    pub fn with_model(model_name: &str) -> Result<Self> {
        info!("Loading embedding model: {}", model_name);

        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(model_name.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .context("Failed to download config.json")?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("Failed to download tokenizer.json")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download model.safetensors")?;

        let config: Config = serde_json::from_str(
            &std::fs::read_to_string(&config_path).context("Failed to read config.json")?,
        )
        .context("Failed to parse config.json")?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .context("Failed to load model weights")?
        };
        let bert = BertModel::load(vb, &config).context("Failed to build BERT model")?;

        debug!(hidden_size = config.hidden_size, "Embedding model loaded");

        Ok(Self {
            model: Arc::new(Model {
                bert,
                tokenizer,
                device,
            }),
        })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.forward_batch(&texts))
            .await
            .map_err(|e| anyhow!("Embedding task panicked: {}", e))?
    }
}

impl Model {
    /// Batch forward pass with CLS extraction
    fn forward_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = Vec::with_capacity(texts.len() * max_len);
        let mut attention_mask = Vec::with_capacity(texts.len() * max_len);
        let mut token_type_ids = Vec::with_capacity(texts.len() * max_len);

        for encoding in &encodings {
            let pad = max_len - encoding.get_ids().len();
            input_ids.extend(encoding.get_ids().iter().copied().chain(std::iter::repeat(0).take(pad)));
            attention_mask.extend(
                encoding
                    .get_attention_mask()
                    .iter()
                    .copied()
                    .chain(std::iter::repeat(0).take(pad)),
            );
            token_type_ids.extend(
                encoding
                    .get_type_ids()
                    .iter()
                    .copied()
                    .chain(std::iter::repeat(0).take(pad)),
            );
        }

        let shape = (texts.len(), max_len);
        let input_ids = Tensor::from_vec(input_ids, shape, &self.device)?.to_dtype(DType::U32)?;
        let attention_mask = Tensor::from_vec(attention_mask, shape, &self.device)?;
        let token_type_ids =
            Tensor::from_vec(token_type_ids, shape, &self.device)?.to_dtype(DType::U32)?;

        let output = self
            .bert
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // (batch, seq, hidden) -> (batch, hidden) at position 0
        let cls = output.narrow(1, 0, 1)?.squeeze(1)?;

        let norm = cls.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::MAX)?;
        let normalized = cls.broadcast_div(&norm)?;

        Ok(normalized.to_vec2::<f32>()?)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.run(vec![format!("{}{}", QUERY_PREFIX, text)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding produced"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.run(
            texts
                .iter()
                .map(|t| format!("{}{}", QUERY_PREFIX, t))
                .collect(),
        )
        .await
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.run(texts.iter().map(|t| t.to_string()).collect()).await
    }

    fn model_name(&self) -> &str {
        MODEL_REPO
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}
