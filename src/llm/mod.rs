//! LLM client abstraction
//!
//! Unified interface over the providers used for disambiguation and task
//! decomposition. Both callers need structured output, so `chat_with_tool`
//! is the workhorse: it forces the model to answer through a JSON-schema'd
//! tool call instead of free text.
//!
//! ## Backend Selection
//!
//! Set the `LLM_BACKEND` environment variable:
//! - `anthropic` (default): Anthropic Claude API, key in `ANTHROPIC_API_KEY`
//! - `openai`: OpenAI API, key in `OPENAI_API_KEY`

mod anthropic;
mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MatcherError, MatcherResult};

/// Cap on response size; both callers answer in a few short fields
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Tool/function definition for structured output
///
/// - Anthropic: maps to `tools` array with `tool_choice`
/// - OpenAI: maps to `functions` array with `function_call`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters
    pub parameters: serde_json::Value,
}

/// Structured arguments returned by a forced tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Unified LLM client interface for both Anthropic and OpenAI
///
/// Implementations must decode deterministically (temperature 0) so that
/// identical input yields identical verdicts.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Call the LLM with system + user prompts, return raw text response
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Call the LLM expecting JSON response
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Call LLM with a tool/function, forcing structured output
    async fn chat_with_tool(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tool: &ToolDefinition,
    ) -> Result<ToolCallResult>;

    /// Get the model name for logging
    fn model_name(&self) -> &str;

    /// Get the provider name for logging
    fn provider_name(&self) -> &str;
}

/// Provider that answers the selection and decomposition tool calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum LlmBackend {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    #[cfg_attr(feature = "cli", value(name = "openai"))]
    OpenAi,
}

impl LlmBackend {
    /// `LLM_BACKEND`, Anthropic when unset
    pub fn from_env() -> MatcherResult<Self> {
        match std::env::var("LLM_BACKEND") {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::default()),
        }
    }

    /// API key for this provider, from its environment variable
    pub fn api_key(self) -> MatcherResult<String> {
        let var = match self {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        };
        std::env::var(var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| MatcherError::Config(format!("{} is required for the {} backend", var, self)))
    }
}

impl FromStr for LlmBackend {
    type Err = MatcherError;

    fn from_str(s: &str) -> MatcherResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            "openai" | "gpt" => Ok(LlmBackend::OpenAi),
            other => Err(MatcherError::Config(format!(
                "unknown LLM_BACKEND '{}', expected anthropic or openai",
                other
            ))),
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LlmBackend::Anthropic => "anthropic",
            LlmBackend::OpenAi => "openai",
        })
    }
}

/// Build the client selected by `LLM_BACKEND`
pub fn create_llm_client() -> Result<Arc<dyn LlmClient>> {
    let backend = LlmBackend::from_env()?;
    create_llm_client_for(backend)
}

/// Build a client for an explicit backend, reading its API key from the environment
pub fn create_llm_client_for(backend: LlmBackend) -> Result<Arc<dyn LlmClient>> {
    let api_key = backend.api_key()?;
    let client: Arc<dyn LlmClient> = match backend {
        LlmBackend::Anthropic => Arc::new(AnthropicClient::new(api_key)),
        LlmBackend::OpenAi => Arc::new(OpenAiClient::new(api_key)),
    };
    tracing::info!(
        provider = client.provider_name(),
        model = client.model_name(),
        "LLM client ready"
    );
    Ok(client)
}

/// Strip a ```json fence if a model wrapped its answer in one
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!("claude".parse::<LlmBackend>().unwrap(), LlmBackend::Anthropic);
        assert_eq!(" GPT ".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert!(matches!(
            "mistral".parse::<LlmBackend>(),
            Err(MatcherError::Config(_))
        ));
        assert_eq!(LlmBackend::OpenAi.to_string(), "openai");
        assert_eq!(
            serde_json::from_str::<LlmBackend>("\"openai\"").unwrap(),
            LlmBackend::OpenAi
        );
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}
