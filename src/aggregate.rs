//! Route aggregation for multi-task requests

use rust_decimal::Decimal;

use crate::safety::SafetyFlag;
use crate::types::{AggregateResult, AggregateRoute, MatchedItem, Route, TaskItem, TaskMatch};

/// Combine per-task verdicts into one routing decision.
///
/// `utterance_flags` are flags raised over the whole utterance. They force
/// at least `Mixed` even when the decomposed task texts no longer carry the
/// hazard wording.
pub fn aggregate(
    results: Vec<TaskMatch>,
    utterance_flags: Vec<SafetyFlag>,
    short_circuited: bool,
) -> AggregateResult {
    let tasks: Vec<TaskItem> = results.iter().map(|r| r.task.clone()).collect();

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    for r in &results {
        match (&r.result.service, r.result.matched) {
            (Some(service), true) => {
                let line_total = if r.result.route == Route::SiteVisit {
                    Decimal::ZERO
                } else {
                    service.price * Decimal::from(r.task.quantity)
                };
                matched.push(MatchedItem {
                    task: r.task.clone(),
                    service: service.clone(),
                    quantity: r.task.quantity,
                    line_total,
                });
            }
            _ => unmatched.push(r.task.clone()),
        }
    }

    let total_price = matched.iter().map(|m| m.line_total).sum();
    let route = combine_routes(&results, !utterance_flags.is_empty());

    AggregateResult {
        tasks,
        results,
        matched,
        unmatched,
        total_price,
        route,
        safety_flags: utterance_flags,
        short_circuited,
    }
}

/// Most conservative applicable route
pub fn combine_routes(results: &[TaskMatch], utterance_flagged: bool) -> AggregateRoute {
    if results.is_empty() {
        return if utterance_flagged {
            AggregateRoute::SiteVisit
        } else {
            AggregateRoute::VideoQuote
        };
    }

    let site_visits = results
        .iter()
        .filter(|r| r.result.route == Route::SiteVisit)
        .count();

    if site_visits == results.len() {
        return AggregateRoute::SiteVisit;
    }
    if site_visits > 0 || utterance_flagged {
        return AggregateRoute::Mixed;
    }
    if results
        .iter()
        .any(|r| !r.result.matched || r.result.route == Route::VideoQuote)
    {
        return AggregateRoute::VideoQuote;
    }
    AggregateRoute::InstantPrice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchMethod, MatchResult, Service};

    fn service(code: &str, pence: i64) -> Service {
        Service {
            code: code.to_string(),
            name: code.to_string(),
            description: String::new(),
            price: Decimal::new(pence, 2),
            estimated_minutes: 30,
            keywords: vec![],
            negative_keywords: vec![],
            embedding: None,
            category: "general".to_string(),
            is_active: true,
        }
    }

    fn matched(position: usize, quantity: u32, svc: &Service, route: Route) -> TaskMatch {
        TaskMatch {
            task: TaskItem::new(format!("task {}", position), quantity, position),
            result: MatchResult::matched(svc, 90, MatchMethod::Lexical, route, "test"),
        }
    }

    fn unmatched(position: usize) -> TaskMatch {
        TaskMatch {
            task: TaskItem::new(format!("task {}", position), 1, position),
            result: MatchResult::no_match("nothing"),
        }
    }

    fn site_visit(position: usize) -> TaskMatch {
        let mut result = MatchResult::no_match("flagged");
        result.route = Route::SiteVisit;
        TaskMatch {
            task: TaskItem::new(format!("task {}", position), 1, position),
            result,
        }
    }

    #[test]
    fn test_all_instant_sums_lines() {
        let tap = service("TAP", 6500);
        let shelf = service("SHELF", 4000);
        let agg = aggregate(
            vec![
                matched(0, 1, &tap, Route::InstantPrice),
                matched(1, 2, &shelf, Route::InstantPrice),
            ],
            vec![],
            false,
        );
        assert_eq!(agg.route, AggregateRoute::InstantPrice);
        assert_eq!(agg.total_price, Decimal::new(14500, 2));
        assert_eq!(agg.matched[1].line_total, Decimal::new(8000, 2));
        assert!(agg.unmatched.is_empty());
    }

    #[test]
    fn test_unmatched_forces_video_quote() {
        let tap = service("TAP", 6500);
        let agg = aggregate(
            vec![matched(0, 1, &tap, Route::InstantPrice), unmatched(1)],
            vec![],
            false,
        );
        assert_eq!(agg.route, AggregateRoute::VideoQuote);
        assert_eq!(agg.unmatched.len(), 1);
        assert_eq!(agg.total_price, Decimal::new(6500, 2));
    }

    #[test]
    fn test_site_visit_variants() {
        let tap = service("TAP", 6500);
        assert_eq!(
            combine_routes(&[site_visit(0), site_visit(1)], false),
            AggregateRoute::SiteVisit
        );
        assert_eq!(
            combine_routes(&[matched(0, 1, &tap, Route::InstantPrice), site_visit(1)], false),
            AggregateRoute::Mixed
        );
        assert_eq!(
            combine_routes(&[matched(0, 1, &tap, Route::InstantPrice)], true),
            AggregateRoute::Mixed
        );
    }

    #[test]
    fn test_medium_lexical_counts_as_video_quote() {
        let tap = service("TAP", 6500);
        let agg = aggregate(
            vec![
                matched(0, 1, &tap, Route::InstantPrice),
                matched(1, 1, &tap, Route::VideoQuote),
            ],
            vec![],
            false,
        );
        assert_eq!(agg.route, AggregateRoute::VideoQuote);
        assert_eq!(agg.total_price, Decimal::new(13000, 2));
    }
}
