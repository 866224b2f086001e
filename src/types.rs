//! Core types shared by every matching stage
//!
//! Catalog entries ([`Service`]) are read-only to the engine. Everything else
//! here is ephemeral: created for one detection call and returned to the caller.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::safety::SafetyFlag;

// =============================================================================
// Catalog
// =============================================================================

/// A standardized, fixed-price unit of work in the catalog (a "SKU")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Unique catalog code, also the identity used for deduplication
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    /// Estimated duration in minutes
    #[serde(default)]
    pub estimated_minutes: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Phrases that veto a match regardless of positive signal
    #[serde(default)]
    pub negative_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_active() -> bool {
    true
}

impl Service {
    /// Text used when embedding this service as a search target
    pub fn embedding_text(&self) -> String {
        let mut text = self.name.clone();
        if !self.description.is_empty() {
            text.push_str(". ");
            text.push_str(&self.description);
        }
        if !self.keywords.is_empty() {
            text.push_str(". ");
            text.push_str(&self.keywords.join(", "));
        }
        text
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// A single unit of work extracted from one utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub description: String,
    pub quantity: u32,
    /// Position in the decomposition, starting at 0
    pub position: usize,
}

impl TaskItem {
    pub fn new(description: impl Into<String>, quantity: u32, position: usize) -> Self {
        Self {
            description: description.into(),
            quantity: quantity.max(1),
            position,
        }
    }

    /// The whole utterance treated as one task
    pub fn whole(text: &str) -> Self {
        Self::new(text.trim(), 1, 0)
    }
}

// =============================================================================
// Routing vocabulary
// =============================================================================

/// Which stage produced a match verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Lexical,
    Vector,
    Llm,
    Hybrid,
    Heuristic,
    None,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchMethod::Lexical => "lexical",
            MatchMethod::Vector => "vector",
            MatchMethod::Llm => "llm",
            MatchMethod::Hybrid => "hybrid",
            MatchMethod::Heuristic => "heuristic",
            MatchMethod::None => "none",
        };
        write!(f, "{}", s)
    }
}

/// Next workflow action for a single task
///
/// Variants are declared in increasing order of conservativeness so that
/// `Ord` gives the worst-case combination directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    InstantPrice,
    VideoQuote,
    SiteVisit,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Route::InstantPrice => "instant_price",
            Route::VideoQuote => "video_quote",
            Route::SiteVisit => "site_visit",
        };
        write!(f, "{}", s)
    }
}

/// Overall decision for a multi-task request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateRoute {
    InstantPrice,
    VideoQuote,
    SiteVisit,
    /// Some tasks need a visit; visit-level handling applies
    Mixed,
}

impl From<Route> for AggregateRoute {
    fn from(route: Route) -> Self {
        match route {
            Route::InstantPrice => AggregateRoute::InstantPrice,
            Route::VideoQuote => AggregateRoute::VideoQuote,
            Route::SiteVisit => AggregateRoute::SiteVisit,
        }
    }
}

/// Whether an operator must look at a match before it is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLight {
    Green,
    Amber,
    Red,
}

/// Suggested operator action accompanying a traffic light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorAction {
    Confirm,
    Review,
    Override,
}

// =============================================================================
// Results
// =============================================================================

/// Verdict for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    pub service: Option<Service>,
    /// 0-100
    pub confidence: u8,
    pub method: MatchMethod,
    pub rationale: String,
    pub route: Route,
    pub traffic_light: Option<TrafficLight>,
    pub suggested_action: Option<OperatorAction>,
}

impl MatchResult {
    /// A confirmed match against `service`
    pub fn matched(
        service: &Service,
        confidence: u8,
        method: MatchMethod,
        route: Route,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            matched: true,
            service: Some(service.clone()),
            confidence: confidence.min(100),
            method,
            rationale: rationale.into(),
            route,
            traffic_light: None,
            suggested_action: None,
        }
    }

    /// No stage produced a match: recommend a video quote
    pub fn no_match(rationale: impl Into<String>) -> Self {
        Self {
            matched: false,
            service: None,
            confidence: 0,
            method: MatchMethod::None,
            rationale: rationale.into(),
            route: Route::VideoQuote,
            traffic_light: Some(TrafficLight::Red),
            suggested_action: Some(OperatorAction::Override),
        }
    }

    /// Input too short to say anything about
    pub fn too_short() -> Self {
        let mut result = Self::no_match("Input too short to match");
        result.traffic_light = None;
        result.suggested_action = None;
        result
    }

    pub fn with_tag(mut self, light: TrafficLight, action: OperatorAction) -> Self {
        self.traffic_light = Some(light);
        self.suggested_action = Some(action);
        self
    }

    pub fn service_code(&self) -> Option<&str> {
        self.service.as_ref().map(|s| s.code.as_str())
    }
}

/// A task paired with its verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMatch {
    pub task: TaskItem,
    pub result: MatchResult,
}

/// A task with a confirmed service and its priced line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedItem {
    pub task: TaskItem,
    pub service: Service,
    pub quantity: u32,
    pub line_total: Decimal,
}

/// Combined verdict for a compound utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub tasks: Vec<TaskItem>,
    pub results: Vec<TaskMatch>,
    pub matched: Vec<MatchedItem>,
    pub unmatched: Vec<TaskItem>,
    pub total_price: Decimal,
    pub route: AggregateRoute,
    /// Flags raised over the whole utterance, independent of decomposition
    #[serde(default)]
    pub safety_flags: Vec<SafetyFlag>,
    /// True when the speculative full-text scan made decomposition unnecessary
    #[serde(default)]
    pub short_circuited: bool,
}

// =============================================================================
// Options
// =============================================================================

/// Declared client type for an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    #[default]
    Residential,
    Commercial,
    ManagedProperty,
}

/// Caller signals known from outside the text (e.g. CRM flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallerProfile {
    #[serde(default)]
    pub elderly: bool,
    #[serde(default)]
    pub technology_averse: bool,
}

/// Per-call knobs for detection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectOptions {
    #[serde(default)]
    pub client_type: Option<ClientType>,
    #[serde(default)]
    pub caller: CallerProfile,
    /// Earlier utterances of the same interaction, oldest first
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub skip_vector: bool,
    #[serde(default)]
    pub skip_llm: bool,
}

impl DetectOptions {
    pub fn with_client_type(mut self, client_type: ClientType) -> Self {
        self.client_type = Some(client_type);
        self
    }

    pub fn without_llm(mut self) -> Self {
        self.skip_llm = true;
        self
    }

    pub fn without_vector(mut self) -> Self {
        self.skip_vector = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_ordering_is_conservative() {
        assert!(Route::SiteVisit > Route::VideoQuote);
        assert!(Route::VideoQuote > Route::InstantPrice);
        assert_eq!(
            [Route::InstantPrice, Route::SiteVisit, Route::VideoQuote]
                .into_iter()
                .max(),
            Some(Route::SiteVisit)
        );
    }

    #[test]
    fn test_task_quantity_floor() {
        assert_eq!(TaskItem::new("hang shelf", 0, 0).quantity, 1);
    }

    #[test]
    fn test_no_match_shape() {
        let r = MatchResult::no_match("nothing");
        assert!(!r.matched);
        assert_eq!(r.method, MatchMethod::None);
        assert_eq!(r.route, Route::VideoQuote);
    }

    #[test]
    fn test_service_deserializes_with_defaults() {
        let json = r#"{"code":"TAP-01","name":"Tap repair","price":"65.00"}"#;
        let service: Service = serde_json::from_str(json).unwrap();
        assert!(service.is_active);
        assert_eq!(service.category, "general");
        assert!(service.negative_keywords.is_empty());
    }

    #[test]
    fn test_method_serializes_snake_case() {
        let json = serde_json::to_string(&MatchMethod::Heuristic).unwrap();
        assert_eq!(json, "\"heuristic\"");
    }
}
