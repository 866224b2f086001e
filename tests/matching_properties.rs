//! Property tests for the pure parts of matching

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;
use rust_decimal::Decimal;

use job_matcher::aggregate::aggregate;
use common::{full_engine, ConceptEmbedder, ScriptedLlm};
use job_matcher::{
    AggregateRoute, CallerProfile, DetectOptions, LexicalMatcher, MatchMethod, MatchResult, Route,
    SafetyGate, TaskItem, TaskMatch,
};

const FILLER: &[&str] = &[
    "kitchen", "upstairs", "leaking", "washer", "today", "urgent", "tap", "dripping", "please",
    "shelves", "hallway", "the",
];

fn filler() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(FILLER), 0..8).prop_map(|words| words.join(" "))
}

fn route() -> impl Strategy<Value = Route> {
    prop_oneof![
        Just(Route::InstantPrice),
        Just(Route::VideoQuote),
        Just(Route::SiteVisit),
    ]
}

fn task_match(position: usize, matched: bool, route: Route) -> TaskMatch {
    let service = common::catalog().remove(0);
    let result = if matched {
        MatchResult::matched(&service, 90, MatchMethod::Lexical, route, "test")
    } else {
        let mut result = MatchResult::no_match("test");
        result.route = route;
        result
    };
    TaskMatch {
        task: TaskItem::new(format!("task {}", position), 1, position),
        result,
    }
}

proptest! {
    #[test]
    fn negative_keyword_always_vetoes(before in filler(), after in filler()) {
        let input = format!("{} dripping tap {} bathroom refit {}", before, after, before);
        let ranked = LexicalMatcher::new().rank(&input, &common::catalog());
        prop_assert!(ranked.iter().all(|c| c.service.code != "TAP-01"));
    }

    #[test]
    fn negative_keyword_vetoes_every_stage(before in filler(), after in filler()) {
        let input = format!("{} tap washer spout {} bathroom refit {}", before, after, before);
        // The model always takes the first shortlisted service
        let llm = Arc::new(ScriptedLlm::new().with_selection(json!({
            "candidate_number": 1,
            "confidence": 95,
            "rationale": "first"
        })));
        let engine = full_engine(Arc::new(ConceptEmbedder::default()), llm);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let result = runtime.block_on(engine.detect(&input, &DetectOptions::default()));
        prop_assert_ne!(result.service_code(), Some("TAP-01"));
    }

    #[test]
    fn lexical_ranking_is_deterministic(input in filler()) {
        let matcher = LexicalMatcher::new();
        let catalog = common::catalog();
        let first: Vec<(String, f32)> = matcher
            .rank(&input, &catalog)
            .into_iter()
            .map(|c| (c.service.code, c.score))
            .collect();
        let second: Vec<(String, f32)> = matcher
            .rank(&input, &catalog)
            .into_iter()
            .map(|c| (c.service.code, c.score))
            .collect();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn scores_stay_in_range(input in filler()) {
        for candidate in LexicalMatcher::new().rank(&input, &common::catalog()) {
            prop_assert!((0.0..=100.0).contains(&candidate.score));
        }
    }

    #[test]
    fn gas_mention_always_flags(before in filler(), after in filler()) {
        let input = format!("{} there is a smell of gas {}", before, after);
        let assessment = SafetyGate::new().assess(&input, None, &CallerProfile::default());
        prop_assert!(assessment.is_flagged());
        prop_assert_eq!(assessment.verdict().route, Route::SiteVisit);
    }

    #[test]
    fn aggregate_route_is_never_better_than_any_task(
        tasks in prop::collection::vec((any::<bool>(), route()), 1..6),
        flagged in any::<bool>(),
    ) {
        let results: Vec<TaskMatch> = tasks
            .iter()
            .enumerate()
            .map(|(i, (matched, route))| task_match(i, *matched, *route))
            .collect();
        let any_unmatched = tasks.iter().any(|(matched, _)| !matched);
        let any_visit = tasks.iter().any(|(_, r)| *r == Route::SiteVisit);
        let flags = if flagged {
            vec![job_matcher::SafetyFlag::GasHazard]
        } else {
            Vec::new()
        };

        let result = aggregate(results, flags, false);

        if any_unmatched || any_visit || flagged {
            prop_assert_ne!(result.route, AggregateRoute::InstantPrice);
        }
        if flagged {
            prop_assert!(matches!(result.route, AggregateRoute::Mixed | AggregateRoute::SiteVisit));
        }
        let expected: Decimal = result.matched.iter().map(|m| m.line_total).sum();
        prop_assert_eq!(result.total_price, expected);
        prop_assert_eq!(result.matched.len() + result.unmatched.len(), tasks.len());
    }
}
