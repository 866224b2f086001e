//! The job matching engine
//!
//! Wires the catalog cache, the strategy pipeline, the decomposer and the
//! aggregator together behind four entry points: `detect`,
//! `detect_multi_task`, and their `_with_context` variants for live
//! interactions. None of them return errors. Every failing dependency has a
//! conservative fallback inside its own stage.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::aggregate;
use crate::catalog::{CatalogCache, CatalogStore};
use crate::config::{thresholds, MatcherConfig};
use crate::context::InteractionContext;
use crate::decompose::TaskDecomposer;
use crate::disambiguate::LlmDisambiguator;
use crate::embedding::{
    create_embedding_provider, EmbeddingCache, EmbeddingProvider, SimilaritySearch, VectorStore,
};
use crate::error::MatcherResult;
use crate::lexical::{looks_compound, LexicalCandidate, LexicalMatcher, SynonymTable};
use crate::llm::{create_llm_client, LlmClient};
use crate::safety::SafetyGate;
use crate::strategy::{
    LexicalStrategy, LlmStrategy, MatchPipeline, SafetyStrategy, StageContext, VectorStrategy,
};
use crate::text::trailing_window;
use crate::types::{AggregateResult, DetectOptions, MatchResult, Service, TaskItem, TaskMatch};

/// Matches free-text job descriptions to catalog services and routes them
pub struct JobMatcher {
    catalog: Arc<CatalogCache>,
    lexical: Arc<LexicalMatcher>,
    safety: SafetyGate,
    search: Option<Arc<SimilaritySearch>>,
    decomposer: Option<TaskDecomposer>,
    pipeline: MatchPipeline,
    config: MatcherConfig,
}

/// Builder for [`JobMatcher`]. Only the catalog store is required.
pub struct JobMatcherBuilder {
    store: Arc<dyn CatalogStore>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    llm: Option<Arc<dyn LlmClient>>,
    synonyms: SynonymTable,
    config: MatcherConfig,
}

impl JobMatcherBuilder {
    pub fn with_embeddings(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(provider);
        self
    }

    /// Native similarity search; brute-force cosine is used without one
    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_config(mut self, config: MatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> JobMatcher {
        let config = self.config;
        let catalog = Arc::new(CatalogCache::with_config(self.store, &config));
        let lexical = Arc::new(LexicalMatcher::with_synonyms(self.synonyms));
        let safety = SafetyGate::new();

        let search = self.embeddings.map(|provider| {
            Arc::new(SimilaritySearch::with_config(
                Arc::new(EmbeddingCache::new(provider)),
                self.vector_store,
                &config,
            ))
        });

        let mut pipeline = MatchPipeline::new(vec![
            Box::new(SafetyStrategy::new(safety)),
            Box::new(LexicalStrategy::new(Arc::clone(&lexical))),
        ]);
        if let Some(search) = &search {
            pipeline.push(Box::new(VectorStrategy::new(Arc::clone(search), &config)));
        }
        let decomposer = self.llm.map(|llm| {
            pipeline.push(Box::new(LlmStrategy::new(
                LlmDisambiguator::new(Arc::clone(&llm)),
                &config,
            )));
            TaskDecomposer::new(llm).with_max_tasks(config.max_tasks)
        });

        info!(stages = ?pipeline.stage_names(), "Job matcher ready");

        JobMatcher {
            catalog,
            lexical,
            safety,
            search,
            decomposer,
            pipeline,
            config,
        }
    }
}

impl JobMatcher {
    pub fn builder(store: Arc<dyn CatalogStore>) -> JobMatcherBuilder {
        JobMatcherBuilder {
            store,
            embeddings: None,
            vector_store: None,
            llm: None,
            synonyms: SynonymTable::default(),
            config: MatcherConfig::default(),
        }
    }

    /// Build from `JOB_MATCHER_*`, `EMBEDDING_BACKEND` and `LLM_BACKEND`.
    ///
    /// A provider that cannot be configured is left out and its stage is
    /// skipped, which narrows matching to the remaining stages.
    pub fn from_env(store: Arc<dyn CatalogStore>) -> MatcherResult<Self> {
        let mut builder = Self::builder(store).with_config(MatcherConfig::from_env()?);

        match create_embedding_provider() {
            Ok(provider) => builder = builder.with_embeddings(provider),
            Err(e) => warn!(error = %e, "Embeddings disabled"),
        }
        match create_llm_client() {
            Ok(llm) => builder = builder.with_llm(llm),
            Err(e) => warn!(error = %e, "LLM stages disabled"),
        }

        Ok(builder.build())
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match one task description
    #[instrument(skip(self, options), fields(len = text.len()))]
    pub async fn detect(&self, text: &str, options: &DetectOptions) -> MatchResult {
        if is_too_short(text) {
            return MatchResult::too_short();
        }
        let services = self.catalog.get_active_services().await;
        self.run_pipeline(text, &services, options).await
    }

    /// Split a compound utterance and match each task
    pub async fn detect_multi_task(&self, text: &str) -> AggregateResult {
        self.detect_multi_task_with_options(text, &DetectOptions::default())
            .await
    }

    #[instrument(skip(self, options), fields(len = text.len()))]
    pub async fn detect_multi_task_with_options(
        &self,
        text: &str,
        options: &DetectOptions,
    ) -> AggregateResult {
        if is_too_short(text) {
            let task = TaskItem::whole(text);
            return aggregate(
                vec![TaskMatch {
                    task,
                    result: MatchResult::too_short(),
                }],
                Vec::new(),
                false,
            );
        }

        // Launch decomposition first so the lexical scan overlaps with it
        let decomposition = self.decomposer.clone().map(|decomposer| {
            let owned = text.to_string();
            tokio::spawn(async move { decomposer.decompose(&owned).await })
        });

        let services = self.catalog.get_active_services().await;
        let utterance = StageContext::new(text, &services, options).accumulated_text();
        let utterance_safety = self
            .safety
            .assess(&utterance, options.client_type, &options.caller);

        let ranked = self.lexical.rank(text, &services);
        if !utterance_safety.is_flagged() {
            if let Some(result) = self.short_circuit(&ranked, text) {
                // The decomposition may still complete; its result is dropped
                drop(decomposition);
                debug!("Speculative lexical scan short-circuited decomposition");
                return aggregate(
                    vec![TaskMatch {
                        task: TaskItem::whole(text),
                        result,
                    }],
                    Vec::new(),
                    true,
                );
            }
        }

        let tasks = match decomposition {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!(error = %e, "Decomposition task failed");
                vec![TaskItem::whole(text)]
            }),
            None => vec![TaskItem::whole(text)],
        };

        // Per-task safety sees the task text plus interaction-level signals
        let task_options = DetectOptions {
            history: Vec::new(),
            ..options.clone()
        };

        self.prefetch_embeddings(&tasks, &services, &task_options)
            .await;

        let results = join_all(tasks.into_iter().map(|task| {
            let services = &services;
            let task_options = &task_options;
            async move {
                let result = if is_too_short(&task.description) {
                    MatchResult::too_short()
                } else {
                    self.run_pipeline(&task.description, services, task_options)
                        .await
                };
                TaskMatch { task, result }
            }
        }))
        .await;

        aggregate(results, utterance_safety.flags, false)
    }

    /// Incremental detection for a live interaction.
    ///
    /// The latest utterance alone is tried first; a high lexical hit returns
    /// immediately unless the accumulated history trips the safety gate.
    /// Otherwise the gate runs over the full history, and finally the whole
    /// pipeline runs over a trailing window of it.
    #[instrument(skip(self, context, text), fields(interaction = %context.id()))]
    pub async fn detect_with_context(
        &self,
        text: &str,
        context: &mut InteractionContext,
    ) -> MatchResult {
        context.push(text);
        let services = self.catalog.get_active_services().await;
        let full = context.full_text();
        let gate = self
            .safety
            .assess(&full, context.client_type(), context.caller());

        if let Some(best) = self.lexical.rank(text, &services).first() {
            if best.score >= thresholds::LEXICAL_HIGH && !gate.is_flagged() {
                if let Some(result) = self.lexical.classify(best) {
                    debug!(code = %best.service.code, "Context fast path");
                    return result;
                }
            }
        }

        if gate.is_flagged() {
            return gate.verdict();
        }

        let window = trailing_window(&full, self.config.context_window_chars);
        if is_too_short(window) {
            return MatchResult::too_short();
        }
        self.run_pipeline(window, &services, &context.detect_options(false))
            .await
    }

    /// Multi-task detection over a trailing window of the interaction
    pub async fn detect_multi_task_with_context(
        &self,
        text: &str,
        context: &mut InteractionContext,
    ) -> AggregateResult {
        context.push(text);
        let full = context.full_text();
        let window = trailing_window(&full, self.config.context_window_chars).to_string();
        self.detect_multi_task_with_options(&window, &context.detect_options(true))
            .await
    }

    async fn run_pipeline(
        &self,
        text: &str,
        services: &[Service],
        options: &DetectOptions,
    ) -> MatchResult {
        let mut ctx = StageContext::new(text, services, options);
        self.pipeline.run(&mut ctx).await
    }

    /// A single dominant high-scoring service in a non-compound utterance
    fn short_circuit(&self, ranked: &[LexicalCandidate], text: &str) -> Option<MatchResult> {
        let best = ranked.first()?;
        if best.score < thresholds::LEXICAL_SHORT_CIRCUIT {
            return None;
        }
        let rival = ranked[1..]
            .iter()
            .any(|c| c.service.code != best.service.code && c.score >= thresholds::LEXICAL_MEDIUM);
        if rival || looks_compound(text) {
            return None;
        }
        self.lexical.classify(best)
    }

    /// Batch-embed the tasks that will reach the vector stage
    async fn prefetch_embeddings(
        &self,
        tasks: &[TaskItem],
        services: &[Service],
        options: &DetectOptions,
    ) {
        let Some(search) = &self.search else {
            return;
        };
        if options.skip_vector {
            return;
        }

        let pending: Vec<&str> = tasks
            .iter()
            .map(|t| t.description.as_str())
            .filter(|text| !is_too_short(text))
            .filter(|text| {
                !self
                    .safety
                    .assess(text, options.client_type, &options.caller)
                    .is_flagged()
            })
            .filter(|text| {
                self.lexical
                    .rank(text, services)
                    .first()
                    .map_or(true, |best| best.score < thresholds::LEXICAL_MEDIUM)
            })
            .collect();

        if !pending.is_empty() {
            let written = search.cache().prefetch(&pending).await;
            debug!(requested = pending.len(), written, "Prefetched task embeddings");
        }
    }
}

fn is_too_short(text: &str) -> bool {
    text.trim().chars().count() < thresholds::MIN_INPUT_CHARS
}
