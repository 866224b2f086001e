//! Ordered matching strategies for a single task
//!
//! Fallback order is data: a [`MatchPipeline`] holds
//! `[safety, lexical, vector, llm]` and returns the first `Some`. Later
//! stages read what earlier ones left in the [`StageContext`], which is how
//! the LLM shortlist is built from lexical and vector candidates without
//! recomputing them.
//!
//! Services vetoed by a negative keyword in the input are removed when the
//! context is built, so no stage can select them.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::MatcherConfig;
use crate::disambiguate::LlmDisambiguator;
use crate::embedding::{SimilaritySearch, VectorCandidate};
use crate::lexical::{is_vetoed, without_vetoed, LexicalCandidate, LexicalMatcher};
use crate::safety::SafetyGate;
use crate::text;
use crate::types::{
    DetectOptions, MatchMethod, MatchResult, OperatorAction, Route, Service, TrafficLight,
};

/// State shared by the stages of one detection
pub struct StageContext<'a> {
    pub text: &'a str,
    /// Snapshot minus the services the input vetoes
    pub services: Cow<'a, [Service]>,
    pub options: &'a DetectOptions,
    pub lexical: Vec<LexicalCandidate>,
    pub vector: Vec<VectorCandidate>,
}

impl<'a> StageContext<'a> {
    pub fn new(text: &'a str, services: &'a [Service], options: &'a DetectOptions) -> Self {
        Self {
            text,
            services: without_vetoed(text, services),
            options,
            lexical: Vec::new(),
            vector: Vec::new(),
        }
    }

    /// Earlier utterances followed by the current text
    pub fn accumulated_text(&self) -> String {
        if self.options.history.is_empty() {
            return self.text.to_string();
        }
        let mut text = self.options.history.join(" ");
        text.push(' ');
        text.push_str(self.text);
        text
    }
}

/// One stage of the fallback chain
#[async_trait]
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` hands over to the next stage
    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Option<MatchResult>;
}

/// Forces a site visit when any risk flag fires
pub struct SafetyStrategy {
    gate: SafetyGate,
}

impl SafetyStrategy {
    pub fn new(gate: SafetyGate) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl MatchStrategy for SafetyStrategy {
    fn name(&self) -> &'static str {
        "safety"
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Option<MatchResult> {
        let assessment = self.gate.assess(
            &ctx.accumulated_text(),
            ctx.options.client_type,
            &ctx.options.caller,
        );
        assessment.is_flagged().then(|| assessment.verdict())
    }
}

/// Keyword bands; records candidates for the shortlist either way
pub struct LexicalStrategy {
    matcher: Arc<LexicalMatcher>,
}

impl LexicalStrategy {
    pub fn new(matcher: Arc<LexicalMatcher>) -> Self {
        Self { matcher }
    }
}

#[async_trait]
impl MatchStrategy for LexicalStrategy {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Option<MatchResult> {
        ctx.lexical = self.matcher.rank(ctx.text, &ctx.services);
        let best = ctx.lexical.first()?;
        debug!(
            code = %best.service.code,
            score = best.score,
            raw = best.raw_score,
            "Best lexical candidate"
        );
        self.matcher.classify(best)
    }
}

/// Embedding similarity; conclusive only at the accept threshold
pub struct VectorStrategy {
    search: Arc<SimilaritySearch>,
    accept_similarity: f32,
}

impl VectorStrategy {
    pub fn new(search: Arc<SimilaritySearch>, config: &MatcherConfig) -> Self {
        Self {
            search,
            accept_similarity: config.vector_accept_similarity,
        }
    }
}

#[async_trait]
impl MatchStrategy for VectorStrategy {
    fn name(&self) -> &'static str {
        "vector"
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Option<MatchResult> {
        if ctx.options.skip_vector {
            return None;
        }

        ctx.vector = match self.search.candidates(ctx.text, &ctx.services).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Vector stage unavailable");
                return None;
            }
        };

        let best = ctx.vector.first()?;
        if best.similarity < self.accept_similarity {
            return None;
        }

        let confidence = (best.similarity * 100.0).round().clamp(0.0, 100.0) as u8;
        Some(
            MatchResult::matched(
                &best.service,
                confidence,
                MatchMethod::Vector,
                Route::InstantPrice,
                format!(
                    "Semantic match to {} (similarity {:.2})",
                    best.service.name, best.similarity
                ),
            )
            .with_tag(TrafficLight::Amber, OperatorAction::Review),
        )
    }
}

/// Model choice over the union of earlier candidates
pub struct LlmStrategy {
    disambiguator: LlmDisambiguator,
    shortlist_size: usize,
}

impl LlmStrategy {
    pub fn new(disambiguator: LlmDisambiguator, config: &MatcherConfig) -> Self {
        Self {
            disambiguator,
            shortlist_size: config.llm_shortlist_size,
        }
    }
}

#[async_trait]
impl MatchStrategy for LlmStrategy {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Option<MatchResult> {
        if ctx.options.skip_llm {
            return None;
        }

        let shortlist = build_shortlist(&ctx.lexical, &ctx.vector, self.shortlist_size);
        if shortlist.is_empty() {
            return None;
        }

        let from_lexical = shortlist
            .iter()
            .any(|s| ctx.lexical.iter().any(|c| c.service.code == s.code));
        let from_vector = shortlist
            .iter()
            .any(|s| ctx.vector.iter().any(|c| c.service.code == s.code));
        let method = if from_lexical && from_vector {
            MatchMethod::Hybrid
        } else {
            MatchMethod::Llm
        };

        let normalized = text::normalize(ctx.text);
        match self.disambiguator.disambiguate(ctx.text, &shortlist).await {
            Ok(answer) => answer.into_match(&shortlist, method).filter(|result| {
                let vetoed = result
                    .service
                    .as_ref()
                    .map_or(false, |s| is_vetoed(&normalized, s));
                if vetoed {
                    warn!(code = ?result.service_code(), "Model chose a vetoed service, rejecting");
                }
                !vetoed
            }),
            Err(e) => {
                warn!(error = %e, "LLM stage failed, treating as no match");
                None
            }
        }
    }
}

/// Lexical candidates first, then vector, deduplicated by code
pub fn build_shortlist(
    lexical: &[LexicalCandidate],
    vector: &[VectorCandidate],
    cap: usize,
) -> Vec<Service> {
    let mut shortlist: Vec<Service> = Vec::new();
    let services = lexical
        .iter()
        .map(|c| &c.service)
        .chain(vector.iter().map(|c| &c.service));
    for service in services {
        if shortlist.len() >= cap {
            break;
        }
        if !shortlist.iter().any(|s| s.code == service.code) {
            shortlist.push(service.clone());
        }
    }
    shortlist
}

/// Explicit fallback chain
#[derive(Default)]
pub struct MatchPipeline {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl MatchPipeline {
    pub fn new(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn push(&mut self, strategy: Box<dyn MatchStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First verdict in stage order, or the conservative default
    pub async fn run(&self, ctx: &mut StageContext<'_>) -> MatchResult {
        for strategy in &self.strategies {
            if let Some(result) = strategy.evaluate(ctx).await {
                debug!(stage = strategy.name(), matched = result.matched, "Stage produced verdict");
                return result;
            }
        }
        MatchResult::no_match("No confident match; recommend a video quote")
    }
}
