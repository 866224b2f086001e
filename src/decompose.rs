//! Task decomposition
//!
//! Splits one utterance that may describe several jobs ("fix the dripping
//! tap and hang two shelves") into discrete [`TaskItem`]s with quantities.
//! Any failure falls back to treating the whole utterance as one task.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::error::{MatcherError, MatcherResult};
use crate::llm::{LlmClient, ToolDefinition};
use crate::types::TaskItem;

const SYSTEM_PROMPT: &str = "You split a customer's request for household work into separate \
jobs. Return one entry per distinct job, using the customer's own wording for each description. \
Set quantity when the customer gives a count (\"two shelves\" is quantity 2), otherwise 1. \
Never invent jobs that were not asked for. A vague request about a whole room or property \
(\"sort out the bathroom\", \"general repairs around the flat\") is a single job.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DecompositionArgs {
    tasks: Vec<TaskArgs>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskArgs {
    description: String,
    #[serde(default)]
    quantity: Option<i64>,
}

/// LLM-backed splitter for compound requests
#[derive(Clone)]
pub struct TaskDecomposer {
    llm: Arc<dyn LlmClient>,
    max_tasks: usize,
}

impl TaskDecomposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, max_tasks: 10 }
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks.max(1);
        self
    }

    /// Tasks in the utterance; the whole utterance as one task on any failure
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn decompose(&self, text: &str) -> Vec<TaskItem> {
        match self.try_decompose(text).await {
            Ok(tasks) => {
                debug!(count = tasks.len(), "Decomposed utterance");
                tasks
            }
            Err(e) => {
                warn!(error = %e, "Decomposition failed, treating utterance as a single task");
                vec![TaskItem::whole(text)]
            }
        }
    }

    /// Decompose, surfacing the failure reason
    pub async fn try_decompose(&self, text: &str) -> MatcherResult<Vec<TaskItem>> {
        let result = self
            .llm
            .chat_with_tool(SYSTEM_PROMPT, text.trim(), &decomposition_tool())
            .await
            .map_err(|e| MatcherError::Llm(e.to_string()))?;
        parse_tasks(result.arguments, self.max_tasks)
    }
}

fn decomposition_tool() -> ToolDefinition {
    ToolDefinition {
        name: "record_tasks".to_string(),
        description: "Record the separate jobs the customer asked for".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "description": {"type": "string"},
                            "quantity": {"type": "integer", "minimum": 1}
                        },
                        "required": ["description"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["tasks"],
            "additionalProperties": false
        }),
    }
}

fn parse_tasks(arguments: serde_json::Value, max_tasks: usize) -> MatcherResult<Vec<TaskItem>> {
    let args: DecompositionArgs = serde_json::from_value(arguments)
        .map_err(|e| MatcherError::MalformedResponse(format!("record_tasks: {}", e)))?;

    if args.tasks.is_empty() {
        return Err(MatcherError::MalformedResponse("empty task list".into()));
    }
    if args.tasks.iter().any(|t| t.description.trim().is_empty()) {
        return Err(MatcherError::MalformedResponse("blank task description".into()));
    }
    if args.tasks.len() > max_tasks {
        warn!(
            returned = args.tasks.len(),
            max_tasks, "Decomposition truncated"
        );
    }

    Ok(args
        .tasks
        .into_iter()
        .take(max_tasks)
        .enumerate()
        .map(|(position, t)| {
            let quantity = t.quantity.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
            TaskItem::new(t.description.trim(), quantity, position)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCallResult;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    struct ScriptedLlm(Option<serde_json::Value>);

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, _: &str, _: &str) -> Result<String> {
            Err(anyhow!("unused"))
        }

        async fn chat_json(&self, _: &str, _: &str) -> Result<String> {
            Err(anyhow!("unused"))
        }

        async fn chat_with_tool(
            &self,
            _: &str,
            _: &str,
            tool: &ToolDefinition,
        ) -> Result<ToolCallResult> {
            let arguments = self.0.clone().ok_or_else(|| anyhow!("timeout"))?;
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

    fn decomposer(answer: Option<serde_json::Value>) -> TaskDecomposer {
        TaskDecomposer::new(Arc::new(ScriptedLlm(answer)))
    }

    #[tokio::test]
    async fn test_splits_with_quantities() {
        let tasks = decomposer(Some(json!({"tasks": [
            {"description": "fix the dripping tap", "quantity": 1},
            {"description": "hang shelves", "quantity": 2}
        ]})))
        .decompose("fix the dripping tap and hang two shelves")
        .await;

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].quantity, 2);
        assert_eq!(tasks[1].position, 1);
    }

    #[tokio::test]
    async fn test_quantity_floor() {
        let tasks = decomposer(Some(json!({"tasks": [
            {"description": "hang shelf", "quantity": 0},
            {"description": "paint door", "quantity": -3},
            {"description": "bleed radiator"}
        ]})))
        .decompose("hang shelf, paint door, bleed radiator")
        .await;

        assert!(tasks.iter().all(|t| t.quantity == 1));
    }

    #[tokio::test]
    async fn test_failures_fall_back_to_whole_utterance() {
        let text = "fix the tap and hang a shelf";
        for answer in [
            None,
            Some(json!({"tasks": []})),
            Some(json!({"tasks": [{"description": "  "}]})),
            Some(json!({"jobs": [{"description": "fix tap"}]})),
            Some(json!({"tasks": [{"description": "fix tap", "urgency": "high"}]})),
        ] {
            let tasks = decomposer(answer).decompose(text).await;
            assert_eq!(tasks, vec![TaskItem::whole(text)]);
        }
    }

    #[test]
    fn test_max_tasks_cap() {
        let many: Vec<_> = (0..15)
            .map(|i| json!({"description": format!("job {}", i)}))
            .collect();
        let tasks = parse_tasks(json!({ "tasks": many }), 10).unwrap();
        assert_eq!(tasks.len(), 10);
    }
}
