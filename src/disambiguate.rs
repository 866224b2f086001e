//! LLM disambiguation over a candidate shortlist
//!
//! Only reached when neither keyword nor vector evidence is conclusive. The
//! model answers through a forced tool call; anything outside the schema is
//! rejected and counts as "no match" for this stage.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::thresholds;
use crate::error::{MatcherError, MatcherResult};
use crate::llm::{LlmClient, ToolDefinition};
use crate::types::{MatchMethod, MatchResult, OperatorAction, Route, Service, TrafficLight};

const SYSTEM_PROMPT: &str = "You match a customer's description of a household job to a \
fixed-price service catalog. You are shown a numbered shortlist. Pick the single service \
that would fully cover the job as described, or 0 if none of them clearly does. Do not pick \
a service that only covers part of the job, and do not guess when the description is vague. \
Confidence is how sure you are that the chosen service is right, from 0 to 100.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectionArgs {
    /// 1-based index into the shortlist, 0 for none
    candidate_number: u32,
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

/// Validated model answer
#[derive(Debug, Clone, PartialEq)]
pub struct Disambiguation {
    /// 0-based index into the shortlist
    pub choice: Option<usize>,
    pub confidence: u8,
    pub rationale: String,
}

impl Disambiguation {
    /// Turn an answer into a verdict, if it clears the acceptance bar
    pub fn into_match(self, shortlist: &[Service], method: MatchMethod) -> Option<MatchResult> {
        let service = shortlist.get(self.choice?)?;
        if self.confidence <= thresholds::LLM_ACCEPT_CONFIDENCE {
            return None;
        }

        let (light, action) = if self.confidence > thresholds::LLM_GREEN_CONFIDENCE {
            (TrafficLight::Green, OperatorAction::Confirm)
        } else {
            (TrafficLight::Amber, OperatorAction::Review)
        };

        Some(
            MatchResult::matched(
                service,
                self.confidence,
                method,
                Route::InstantPrice,
                format!("Model selected {}: {}", service.name, self.rationale),
            )
            .with_tag(light, action),
        )
    }
}

/// Asks a language model to choose among shortlisted services
#[derive(Clone)]
pub struct LlmDisambiguator {
    llm: Arc<dyn LlmClient>,
}

impl LlmDisambiguator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Ask the model. A `choice` of `None` is a valid "none of these" answer.
    #[instrument(skip(self, shortlist), fields(candidates = shortlist.len(), model = self.llm.model_name()))]
    pub async fn disambiguate(
        &self,
        text: &str,
        shortlist: &[Service],
    ) -> MatcherResult<Disambiguation> {
        if shortlist.is_empty() {
            return Ok(Disambiguation {
                choice: None,
                confidence: 0,
                rationale: "No candidates".to_string(),
            });
        }

        let result = self
            .llm
            .chat_with_tool(SYSTEM_PROMPT, &build_prompt(text, shortlist), &selection_tool())
            .await
            .map_err(|e| MatcherError::Llm(e.to_string()))?;

        let disambiguation = parse_selection(result.arguments, shortlist.len())?;
        debug!(
            choice = ?disambiguation.choice,
            confidence = disambiguation.confidence,
            "Disambiguation answer"
        );
        Ok(disambiguation)
    }
}

fn selection_tool() -> ToolDefinition {
    ToolDefinition {
        name: "select_service".to_string(),
        description: "Select the catalog service that covers the described job".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "candidate_number": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Number of the chosen service from the list, or 0 if none fits"
                },
                "confidence": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 100
                },
                "rationale": {
                    "type": "string",
                    "description": "One short sentence"
                }
            },
            "required": ["candidate_number", "confidence", "rationale"],
            "additionalProperties": false
        }),
    }
}

fn build_prompt(text: &str, shortlist: &[Service]) -> String {
    let mut prompt = format!("Customer said: \"{}\"\n\nCandidate services:\n", text.trim());
    for (i, service) in shortlist.iter().enumerate() {
        prompt.push_str(&format!("{}. {}", i + 1, service.name));
        if !service.description.is_empty() {
            prompt.push_str(&format!(" - {}", service.description));
        }
        prompt.push('\n');
    }
    prompt
}

fn parse_selection(arguments: serde_json::Value, shortlist_len: usize) -> MatcherResult<Disambiguation> {
    let args: SelectionArgs = serde_json::from_value(arguments)
        .map_err(|e| MatcherError::MalformedResponse(format!("select_service: {}", e)))?;

    if !args.confidence.is_finite() || !(0.0..=100.0).contains(&args.confidence) {
        return Err(MatcherError::MalformedResponse(format!(
            "confidence out of range: {}",
            args.confidence
        )));
    }
    // The tool schema declares an integer
    if args.confidence.fract() != 0.0 {
        return Err(MatcherError::MalformedResponse(format!(
            "confidence is not an integer: {}",
            args.confidence
        )));
    }

    let choice = match args.candidate_number as usize {
        0 => None,
        n if n <= shortlist_len => Some(n - 1),
        n => {
            return Err(MatcherError::MalformedResponse(format!(
                "candidate_number {} outside shortlist of {}",
                n, shortlist_len
            )))
        }
    };

    Ok(Disambiguation {
        choice,
        confidence: args.confidence as u8,
        rationale: args.rationale,
    })
}
