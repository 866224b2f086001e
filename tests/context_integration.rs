//! Live interactions: incremental detection over accumulated utterances

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{builder, ConceptEmbedder, ScriptedLlm};
use job_matcher::{
    AggregateRoute, CallerProfile, ContextRegistry, InteractionContext, MatchMethod,
    MatcherConfig, Route, SafetyFlag,
};

#[tokio::test]
async fn test_latest_utterance_fast_path() {
    let engine = builder().build();
    let mut context = InteractionContext::new();

    let result = engine
        .detect_with_context("my kitchen tap keeps dripping", &mut context)
        .await;

    assert_eq!(result.service_code(), Some("TAP-01"));
    assert_eq!(result.method, MatchMethod::Lexical);
    assert_eq!(result.route, Route::InstantPrice);
    assert_eq!(context.utterances().len(), 1);
}

#[tokio::test]
async fn test_hazard_earlier_in_the_call_blocks_fast_path() {
    let engine = builder().build();
    let mut context = InteractionContext::new();

    let first = engine
        .detect_with_context("I think I can smell gas in the hallway", &mut context)
        .await;
    assert_eq!(first.route, Route::SiteVisit);

    let second = engine
        .detect_with_context("anyway my kitchen tap keeps dripping", &mut context)
        .await;
    assert_eq!(second.route, Route::SiteVisit);
    assert_eq!(second.method, MatchMethod::Heuristic);
    assert_eq!(context.utterances().len(), 2);
}

#[tokio::test]
async fn test_vulnerable_caller_profile_applies_to_every_utterance() {
    let engine = builder().build();
    let mut context = InteractionContext::new().with_caller(CallerProfile {
        elderly: true,
        technology_averse: false,
    });

    let result = engine
        .detect_with_context("my kitchen tap keeps dripping", &mut context)
        .await;

    assert_eq!(result.route, Route::SiteVisit);
    assert!(result.rationale.contains(SafetyFlag::VulnerableCaller.label()));
}

#[tokio::test]
async fn test_full_detection_runs_over_trailing_window() {
    let embedder = Arc::new(ConceptEmbedder::default());
    let config = MatcherConfig {
        context_window_chars: 14,
        ..Default::default()
    };
    let engine = builder()
        .with_embeddings(embedder)
        .with_config(config)
        .build();
    let mut context = InteractionContext::new();

    let first = engine
        .detect_with_context("water keeps coming out of the spout", &mut context)
        .await;
    assert_eq!(first.service_code(), Some("TAP-01"));

    // Only "books storage" fits in the window, so the spout drops out
    let second = engine
        .detect_with_context("books storage", &mut context)
        .await;
    assert_eq!(second.service_code(), Some("SHELF-01"));
    assert_eq!(second.method, MatchMethod::Vector);
}

#[tokio::test]
async fn test_wide_window_mixes_both_utterances() {
    let embedder = Arc::new(ConceptEmbedder::default());
    let engine = builder().with_embeddings(embedder).build();
    let mut context = InteractionContext::new();

    engine
        .detect_with_context("the spout", &mut context)
        .await;
    let result = engine
        .detect_with_context("books storage", &mut context)
        .await;

    // Tap and shelf concepts together are ambiguous without a model
    assert!(!result.matched);
    assert_eq!(result.route, Route::VideoQuote);
}

#[tokio::test]
async fn test_multi_task_with_context_uses_history_for_safety() {
    let llm = Arc::new(ScriptedLlm::new().with_tasks(json!({
        "tasks": [
            {"description": "fix dripping tap", "quantity": 1},
            {"description": "hang shelves", "quantity": 1}
        ]
    })));
    let engine = builder().with_llm(llm).build();
    let mut context = InteractionContext::new();

    context.push("there is a big crack in the wall upstairs");
    let result = engine
        .detect_multi_task_with_context("fix dripping tap and hang shelves", &mut context)
        .await;

    // Task texts are clean, the earlier utterance is not
    assert_eq!(result.safety_flags, vec![SafetyFlag::StructuralHazard]);
    assert_eq!(result.route, AggregateRoute::Mixed);
}

#[tokio::test]
async fn test_registry_lifecycle() {
    let registry = ContextRegistry::new(Arc::new(builder().build()));

    let id = registry.begin(None, CallerProfile::default()).await;
    assert_eq!(registry.len().await, 1);

    let result = registry
        .detect_with_context(id, "my kitchen tap keeps dripping")
        .await
        .expect("interaction is open");
    assert_eq!(result.service_code(), Some("TAP-01"));

    let aggregate = registry
        .detect_multi_task_with_context(id, "and hang shelves in the study")
        .await
        .expect("interaction is open");
    assert!(!aggregate.tasks.is_empty());

    let closed = registry.end_interaction(id).await.expect("interaction existed");
    assert_eq!(closed.id(), id);
    assert_eq!(closed.utterances().len(), 2);
    assert!(registry.is_empty().await);

    assert!(registry.detect_with_context(id, "hello again").await.is_none());
    assert!(registry.end_interaction(id).await.is_none());
}

#[tokio::test]
async fn test_registry_keeps_active_interactions() {
    let registry = ContextRegistry::new(Arc::new(builder().build()));
    registry.begin(None, CallerProfile::default()).await;

    let expired = registry.expire_idle(chrono::Duration::minutes(30)).await;
    assert_eq!(expired, 0);
    assert_eq!(registry.len().await, 1);
}
