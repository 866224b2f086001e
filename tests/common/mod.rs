//! Deterministic fakes shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use job_matcher::embedding::Embedding;
use job_matcher::llm::{ToolCallResult, ToolDefinition};
use job_matcher::{
    EmbeddingProvider, InMemoryCatalogStore, JobMatcher, JobMatcherBuilder, LlmClient,
    MatcherError, MatcherResult, Service, VectorHit, VectorStore,
};

/// Words that light up each embedding dimension
const CONCEPTS: &[&[&str]] = &[
    &["tap", "faucet", "washer", "spout"],
    &["shelf", "shelves", "storage", "books"],
    &["tv", "television", "screen"],
    &["toilet", "loo", "cistern", "flush"],
    &["gate", "latch", "garden"],
];

/// Small constant component so no vector is ever all zeros
const BIAS: f32 = 0.05;

pub fn concept_vector(dims: &[usize]) -> Vec<f32> {
    let mut v = vec![0.0; CONCEPTS.len() + 1];
    for &d in dims {
        v[d] = 1.0;
    }
    v[CONCEPTS.len()] = BIAS;
    v
}

pub fn service(
    code: &str,
    name: &str,
    pence: i64,
    keywords: &[&str],
    negatives: &[&str],
    concept: usize,
) -> Service {
    Service {
        code: code.to_string(),
        name: name.to_string(),
        description: String::new(),
        price: Decimal::new(pence, 2),
        estimated_minutes: 60,
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        negative_keywords: negatives.iter().map(|s| s.to_string()).collect(),
        embedding: Some(concept_vector(&[concept])),
        category: "general".to_string(),
        is_active: true,
    }
}

pub fn catalog() -> Vec<Service> {
    vec![
        service(
            "TAP-01",
            "Dripping tap repair",
            6500,
            &["dripping tap", "leaking tap", "tap washer"],
            &["bathroom refit", "new bathroom"],
            0,
        ),
        service(
            "SHELF-01",
            "Shelf hanging",
            4000,
            &["hang shelves", "put up shelf"],
            &[],
            1,
        ),
        service("TV-01", "TV wall mounting", 8500, &["tv bracket", "mount tv"], &[], 2),
        service(
            "TOILET-01",
            "Toilet cistern repair",
            7000,
            &["running toilet", "toilet cistern"],
            &[],
            3,
        ),
        service(
            "GATE-01",
            "Garden gate latch",
            5500,
            &["garden gate latch repair"],
            &[],
            4,
        ),
    ]
}

/// Embeds by concept presence and counts remote calls
#[derive(Default)]
pub struct ConceptEmbedder {
    pub single_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub fail_batch: bool,
}

impl ConceptEmbedder {
    pub fn failing_batch() -> Self {
        Self {
            fail_batch: true,
            ..Default::default()
        }
    }

    pub fn singles(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.singles() + self.batches()
    }

    fn vector_for(text: &str) -> Embedding {
        let words: Vec<&str> = text.split_whitespace().collect();
        let dims: Vec<usize> = CONCEPTS
            .iter()
            .enumerate()
            .filter(|(_, concept)| words.iter().any(|w| concept.contains(w)))
            .map(|(i, _)| i)
            .collect();
        concept_vector(&dims)
    }
}

#[async_trait]
impl EmbeddingProvider for ConceptEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector_for(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batch {
            return Err(anyhow!("batch endpoint unavailable"));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "concept"
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len() + 1
    }
}

/// Answers each tool with a fixed payload, or fails when none is set
#[derive(Default)]
pub struct ScriptedLlm {
    selection: Mutex<Option<Value>>,
    tasks: Mutex<Option<Value>>,
    pub selection_calls: AtomicUsize,
    pub decomposition_calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selection(self, answer: Value) -> Self {
        *self.selection.lock().unwrap() = Some(answer);
        self
    }

    pub fn with_tasks(self, answer: Value) -> Self {
        *self.tasks.lock().unwrap() = Some(answer);
        self
    }

    pub fn selections(&self) -> usize {
        self.selection_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, _: &str, _: &str) -> Result<String> {
        Err(anyhow!("free text is not scripted"))
    }

    async fn chat_json(&self, _: &str, _: &str) -> Result<String> {
        Err(anyhow!("free text is not scripted"))
    }

    async fn chat_with_tool(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        tool: &ToolDefinition,
    ) -> Result<ToolCallResult> {
        let answer = match tool.name.as_str() {
            "select_service" => {
                self.selection_calls.fetch_add(1, Ordering::SeqCst);
                self.selection.lock().unwrap().clone()
            }
            "record_tasks" => {
                self.decomposition_calls.fetch_add(1, Ordering::SeqCst);
                self.tasks.lock().unwrap().clone()
            }
            other => return Err(anyhow!("unexpected tool {}", other)),
        };
        let arguments = answer.ok_or_else(|| anyhow!("model timed out"))?;
        Ok(ToolCallResult {
            tool_name: tool.name.clone(),
            arguments,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &str {
        "test"
    }
}

/// Native vector search that is always down
pub struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn nearest(&self, _: &[f32], _: usize, _: f32) -> MatcherResult<Vec<VectorHit>> {
        Err(MatcherError::VectorSearch("relation service_catalog does not exist".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub fn builder() -> JobMatcherBuilder {
    JobMatcher::builder(Arc::new(InMemoryCatalogStore::new(catalog())))
}

/// Engine with every stage wired to the given fakes
pub fn full_engine(embedder: Arc<ConceptEmbedder>, llm: Arc<ScriptedLlm>) -> JobMatcher {
    builder().with_embeddings(embedder).with_llm(llm).build()
}
