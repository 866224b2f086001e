//! Safety & complexity gate
//!
//! A pure predicate over the accumulated conversation. When any flag fires
//! the task goes to a site visit regardless of how well it matched: an
//! instant price on a gas smell or a vulnerable caller is never acceptable.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text;
use crate::types::{
    CallerProfile, ClientType, MatchMethod, MatchResult, OperatorAction, Route, TrafficLight,
};

/// Why the gate fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyFlag {
    CommercialClient,
    GasHazard,
    ElectricalHazard,
    StructuralHazard,
    ConcealedLeak,
    VulnerableCaller,
    TechnologyAverse,
}

impl SafetyFlag {
    pub fn label(&self) -> &'static str {
        match self {
            SafetyFlag::CommercialClient => "commercial or managed property client",
            SafetyFlag::GasHazard => "gas hazard",
            SafetyFlag::ElectricalHazard => "electrical hazard",
            SafetyFlag::StructuralHazard => "structural hazard",
            SafetyFlag::ConcealedLeak => "concealed damp or leak",
            SafetyFlag::VulnerableCaller => "vulnerable caller",
            SafetyFlag::TechnologyAverse => "caller cannot do video",
        }
    }
}

// Patterns run against text::normalize output: lowercase, no apostrophes,
// punctuation replaced by single spaces.

/// Benign phrases that mention hazard words; removed before matching
static BENIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(smoke|co|carbon monoxide|gas) (alarm|alarms|detector|detectors)\b").unwrap()
});

static TEXT_RULES: Lazy<Vec<(SafetyFlag, Regex)>> = Lazy::new(|| {
    let rules: &[(SafetyFlag, &str)] = &[
        (
            SafetyFlag::GasHazard,
            r"\b(gas|fumes?|carbon monoxide|co poisoning)\b",
        ),
        (
            SafetyFlag::ElectricalHazard,
            r"\b(arcing|arced|sparks?|sparking|scorch(ed|ing)?|scorch marks?|smoke|smoking|melted|melting|burning smell|smells? of burning|smell burning|electric(al)? shocks?|getting (a )?shocks?|tripping)\b",
        ),
        (
            SafetyFlag::StructuralHazard,
            r"\b(collapsed?|collapsing|subsidence|structural|ceiling (is |has )?(fallen|falling|coming down|caving in)|sagging (ceiling|roof|floor)|(big|large|huge) cracks?|cracks? (in|across) (the )?(wall|ceiling)s?)\b",
        ),
        (
            SafetyFlag::ConcealedLeak,
            r"\b(damp|mould|mold|wet patch(es)?|leak(ing)? (behind|inside|under|in) (the )?(wall|ceiling|floor|floorboards)|water (coming )?(through|from) (the )?(ceiling|wall)|water stain(s|ed)?)\b",
        ),
        (
            SafetyFlag::VulnerableCaller,
            r"\b(elderly|pensioner|oap|frail|housebound|disabled|(8|9)\d years? old|in my (seventies|eighties|nineties))\b",
        ),
        (
            SafetyFlag::TechnologyAverse,
            r"\b(no smart ?phone|(dont|do not|doesnt|does not) (have|own|use) (a )?(smart ?phone|mobile|computer)|(cant|cannot|can not|dont|do not) (use|do|work) (whatsapp|video|video calls?|facetime|messaging|text messages|texts|the internet)|not (good|great) with (technology|tech|phones|computers)|no (whatsapp|internet|email))\b",
        ),
        (
            SafetyFlag::CommercialClient,
            r"\b(letting agent|managing agent|property manager|property management|facilities manager|commercial (property|premises|unit|kitchen)|our (office|shop|restaurant|premises)|housing association)\b",
        ),
    ];
    rules
        .iter()
        .map(|(flag, pattern)| (*flag, Regex::new(pattern).unwrap()))
        .collect()
});

/// Result of running the gate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    /// Fired flags, deduplicated, in declaration order
    pub flags: Vec<SafetyFlag>,
    /// The text that triggered each textual flag
    pub evidence: Vec<String>,
}

impl SafetyAssessment {
    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }

    /// The site-visit verdict naming every fired flag
    pub fn verdict(&self) -> MatchResult {
        let names: Vec<&str> = self.flags.iter().map(|f| f.label()).collect();
        let mut rationale = format!("Safety gate: {}", names.join(", "));
        if !self.evidence.is_empty() {
            rationale.push_str(&format!(" (\"{}\")", self.evidence.join("\", \"")));
        }
        MatchResult {
            matched: false,
            service: None,
            confidence: 100,
            method: MatchMethod::Heuristic,
            rationale,
            route: Route::SiteVisit,
            traffic_light: Some(TrafficLight::Amber),
            suggested_action: Some(OperatorAction::Review),
        }
    }

    fn add(&mut self, flag: SafetyFlag, evidence: Option<String>) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        if let Some(e) = evidence {
            if !self.evidence.contains(&e) {
                self.evidence.push(e);
            }
        }
    }
}

/// Pattern-based risk gate
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyGate;

impl SafetyGate {
    pub fn new() -> Self {
        Self
    }

    /// Assess accumulated text plus out-of-band interaction signals
    pub fn assess(
        &self,
        text: &str,
        client_type: Option<ClientType>,
        caller: &CallerProfile,
    ) -> SafetyAssessment {
        let mut assessment = SafetyAssessment::default();

        if matches!(
            client_type,
            Some(ClientType::Commercial) | Some(ClientType::ManagedProperty)
        ) {
            assessment.add(SafetyFlag::CommercialClient, None);
        }
        if caller.elderly {
            assessment.add(SafetyFlag::VulnerableCaller, None);
        }
        if caller.technology_averse {
            assessment.add(SafetyFlag::TechnologyAverse, None);
        }

        let normalized = text::normalize(text);
        let cleaned = BENIGN.replace_all(&normalized, " ");
        for (flag, regex) in TEXT_RULES.iter() {
            if let Some(m) = regex.find(&cleaned) {
                assessment.add(*flag, Some(m.as_str().to_string()));
            }
        }

        assessment.flags.sort();
        assessment
    }
}
