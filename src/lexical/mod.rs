//! Lexical matcher - synonym-expanding keyword scorer
//!
//! The fastest path through the engine: no external calls, pure over the
//! input text and the catalog snapshot.
//!
//! Each service gets two numbers:
//! - a **raw score** (+1.0 per expanded token found among the service's
//!   keyword/name tokens, +0.5 per expanded token longer than 3 characters
//!   that is a substring of one, −5.0 per negative keyword present), used
//!   for ranking evidence
//! - a **score** on a 0-100 scale: coverage of the service's best keyword
//!   phrase by the expanded input, compared against the routing bands
//!
//! A negative keyword present in the input vetoes the service outright.

mod synonyms;

pub use synonyms::SynonymTable;

use std::borrow::Cow;
use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::thresholds;
use crate::text;
use crate::types::{MatchMethod, MatchResult, OperatorAction, Route, Service, TrafficLight};

const PARTIAL_MIN_LEN: usize = 3;
const EXACT_CREDIT: f32 = 1.0;
const PARTIAL_CREDIT: f32 = 0.5;
const NEGATIVE_PENALTY: f32 = 5.0;

/// List separators that suggest more than one job in an utterance
static COMPOUND_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(and|also|plus|then|as well as|along with|another)\b|[,;&+]").unwrap()
});

/// A scored catalog entry
#[derive(Debug, Clone, Serialize)]
pub struct LexicalCandidate {
    pub service: Service,
    /// Best keyword phrase coverage, 0-100
    pub score: f32,
    pub raw_score: f32,
    /// Expanded input tokens that hit the service's tokens
    pub matched_terms: Vec<String>,
}

/// Synonym-expanding keyword scorer
#[derive(Debug, Clone, Default)]
pub struct LexicalMatcher {
    synonyms: SynonymTable,
}

impl LexicalMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_synonyms(synonyms: SynonymTable) -> Self {
        Self { synonyms }
    }

    /// Input tokens plus their synonyms
    pub fn expand(&self, input: &str) -> BTreeSet<String> {
        let tokens = text::tokenize(input);
        self.synonyms.expand_all(&tokens)
    }

    /// Top candidates, best first. Ties keep catalog order.
    pub fn rank(&self, input: &str, services: &[Service]) -> Vec<LexicalCandidate> {
        let normalized = text::normalize(input);
        let expanded = self.expand(input);
        if expanded.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<LexicalCandidate> = services
            .iter()
            .filter_map(|service| score_service(&normalized, &expanded, service))
            .collect();

        // sort_by is stable, so equal keys keep catalog order
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.raw_score.total_cmp(&a.raw_score))
        });
        candidates.truncate(thresholds::LEXICAL_TOP_K);
        candidates
    }

    /// Verdict for the best candidate, if it reaches a routing band.
    ///
    /// `None` means the lexical signal is inconclusive and later stages run.
    pub fn classify(&self, candidate: &LexicalCandidate) -> Option<MatchResult> {
        if candidate.score >= thresholds::LEXICAL_HIGH {
            Some(
                MatchResult::matched(
                    &candidate.service,
                    thresholds::LEXICAL_HIGH_CONFIDENCE,
                    MatchMethod::Lexical,
                    Route::InstantPrice,
                    format!(
                        "Keyword match on {} (score {:.0})",
                        candidate.matched_terms.join(", "),
                        candidate.score
                    ),
                )
                .with_tag(TrafficLight::Green, OperatorAction::Confirm),
            )
        } else if candidate.score >= thresholds::LEXICAL_MEDIUM {
            Some(
                MatchResult::matched(
                    &candidate.service,
                    thresholds::LEXICAL_MEDIUM_CONFIDENCE,
                    MatchMethod::Lexical,
                    Route::VideoQuote,
                    format!(
                        "Partial keyword match on {} (score {:.0}), needs confirmation",
                        candidate.matched_terms.join(", "),
                        candidate.score
                    ),
                )
                .with_tag(TrafficLight::Amber, OperatorAction::Review),
            )
        } else {
            None
        }
    }

    /// Rank and classify in one step
    pub fn detect(&self, input: &str, services: &[Service]) -> Option<MatchResult> {
        self.rank(input, services)
            .first()
            .and_then(|best| self.classify(best))
    }
}

/// Whether the utterance reads like a list of jobs
pub fn looks_compound(input: &str) -> bool {
    COMPOUND_MARKERS.is_match(&input.to_lowercase())
}

/// Number of the service's negative keywords present in normalized input
fn negative_hits(normalized_input: &str, service: &Service) -> usize {
    service
        .negative_keywords
        .iter()
        .map(|n| text::normalize(n))
        .filter(|n| !n.is_empty() && normalized_input.contains(n.as_str()))
        .count()
}

/// Whether a negative keyword of the service appears in the normalized input.
///
/// A vetoed service is never selected by any stage.
pub fn is_vetoed(normalized_input: &str, service: &Service) -> bool {
    negative_hits(normalized_input, service) > 0
}

/// Services the input does not veto. Borrows the snapshot when none are.
pub fn without_vetoed<'s>(input: &str, services: &'s [Service]) -> Cow<'s, [Service]> {
    let normalized = text::normalize(input);
    if !services.iter().any(|s| is_vetoed(&normalized, s)) {
        return Cow::Borrowed(services);
    }
    let eligible: Vec<Service> = services
        .iter()
        .filter(|s| {
            let vetoed = is_vetoed(&normalized, s);
            if vetoed {
                debug!(service = %s.code, "Excluded by negative keyword");
            }
            !vetoed
        })
        .cloned()
        .collect();
    Cow::Owned(eligible)
}

/// Tokens of a service's keywords and name
fn service_tokens(service: &Service) -> BTreeSet<String> {
    service
        .keywords
        .iter()
        .chain(std::iter::once(&service.name))
        .flat_map(|phrase| text::tokenize(phrase))
        .collect()
}

fn score_service(
    normalized_input: &str,
    expanded: &BTreeSet<String>,
    service: &Service,
) -> Option<LexicalCandidate> {
    let negatives = negative_hits(normalized_input, service);

    let tokens = service_tokens(service);
    let mut raw = 0.0f32;
    let mut matched_terms = Vec::new();
    for term in expanded {
        if tokens.contains(term) {
            raw += EXACT_CREDIT;
            matched_terms.push(term.clone());
        } else if term.chars().count() > PARTIAL_MIN_LEN
            && tokens.iter().any(|t| t.contains(term.as_str()))
        {
            raw += PARTIAL_CREDIT;
            matched_terms.push(term.clone());
        }
    }
    raw -= NEGATIVE_PENALTY * negatives as f32;

    // Negative keywords are a veto, not just a penalty
    if negatives > 0 {
        debug!(service = %service.code, raw, "Vetoed by negative keyword");
        return None;
    }
    if raw <= 0.0 {
        return None;
    }

    let score = service
        .keywords
        .iter()
        .chain(std::iter::once(&service.name))
        .map(|phrase| phrase_coverage(phrase, expanded))
        .fold(0.0f32, f32::max);

    Some(LexicalCandidate {
        service: service.clone(),
        score,
        raw_score: raw,
        matched_terms,
    })
}

/// Share of a phrase's tokens covered by the expanded input, 0-100
fn phrase_coverage(phrase: &str, expanded: &BTreeSet<String>) -> f32 {
    let tokens = text::tokenize(phrase);
    if tokens.is_empty() {
        return 0.0;
    }
    let credit: f32 = tokens
        .iter()
        .map(|token| {
            if expanded.contains(token) {
                EXACT_CREDIT
            } else if expanded
                .iter()
                .any(|e| e.chars().count() > PARTIAL_MIN_LEN && token.contains(e.as_str()))
            {
                PARTIAL_CREDIT
            } else {
                0.0
            }
        })
        .sum();
    credit / tokens.len() as f32 * 100.0
}
