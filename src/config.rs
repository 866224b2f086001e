//! Matcher configuration and threshold bands

use std::time::Duration;

use crate::error::{MatcherError, MatcherResult};

/// Threshold bands for routing decisions.
///
/// These were calibrated empirically against real enquiries. Keep them exact
/// unless recalibrating against a labelled sample.
pub mod thresholds {
    /// Trimmed inputs shorter than this never match
    pub const MIN_INPUT_CHARS: usize = 5;

    /// Lexical score (0-100) at or above which we quote instantly
    pub const LEXICAL_HIGH: f32 = 80.0;
    /// Lexical score at or above which we match but ask for a video
    pub const LEXICAL_MEDIUM: f32 = 65.0;
    /// Speculative full-text scan at or above this skips decomposition
    pub const LEXICAL_SHORT_CIRCUIT: f32 = 85.0;
    pub const LEXICAL_HIGH_CONFIDENCE: u8 = 90;
    pub const LEXICAL_MEDIUM_CONFIDENCE: u8 = 80;
    pub const LEXICAL_TOP_K: usize = 5;

    /// Strict lower bound for a vector candidate
    pub const VECTOR_MIN_SIMILARITY: f32 = 0.60;
    /// Vector-only match is conclusive at or above this
    pub const VECTOR_ACCEPT_SIMILARITY: f32 = 0.85;
    pub const VECTOR_TOP_K: usize = 5;

    /// LLM verdicts must be strictly above this to count
    pub const LLM_ACCEPT_CONFIDENCE: u8 = 75;
    /// LLM verdicts strictly above this are green
    pub const LLM_GREEN_CONFIDENCE: u8 = 85;
    pub const LLM_SHORTLIST_SIZE: usize = 8;
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// How long a catalog snapshot is served without reloading
    pub catalog_ttl: Duration,
    pub catalog_retry_attempts: u32,
    /// First backoff delay; doubles on each retry
    pub catalog_retry_base_delay: Duration,
    pub vector_top_k: usize,
    pub vector_min_similarity: f32,
    pub vector_accept_similarity: f32,
    pub llm_shortlist_size: usize,
    /// Trailing window of history fed to full detection in live interactions
    pub context_window_chars: usize,
    pub max_tasks: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            catalog_ttl: Duration::from_secs(3600),
            catalog_retry_attempts: 3,
            catalog_retry_base_delay: Duration::from_secs(1),
            vector_top_k: thresholds::VECTOR_TOP_K,
            vector_min_similarity: thresholds::VECTOR_MIN_SIMILARITY,
            vector_accept_similarity: thresholds::VECTOR_ACCEPT_SIMILARITY,
            llm_shortlist_size: thresholds::LLM_SHORTLIST_SIZE,
            context_window_chars: 1200,
            max_tasks: 10,
        }
    }
}

impl MatcherConfig {
    /// Build from `JOB_MATCHER_*` environment variables, falling back to defaults
    pub fn from_env() -> MatcherResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            catalog_ttl: Duration::from_secs(env_or(
                "JOB_MATCHER_CATALOG_TTL_SECS",
                defaults.catalog_ttl.as_secs(),
            )?),
            catalog_retry_attempts: env_or(
                "JOB_MATCHER_CATALOG_RETRIES",
                defaults.catalog_retry_attempts,
            )?,
            catalog_retry_base_delay: Duration::from_millis(env_or(
                "JOB_MATCHER_CATALOG_RETRY_DELAY_MS",
                defaults.catalog_retry_base_delay.as_millis() as u64,
            )?),
            vector_top_k: env_or("JOB_MATCHER_VECTOR_TOP_K", defaults.vector_top_k)?,
            vector_min_similarity: defaults.vector_min_similarity,
            vector_accept_similarity: env_or(
                "JOB_MATCHER_VECTOR_ACCEPT",
                defaults.vector_accept_similarity,
            )?,
            llm_shortlist_size: env_or("JOB_MATCHER_SHORTLIST_SIZE", defaults.llm_shortlist_size)?,
            context_window_chars: env_or(
                "JOB_MATCHER_CONTEXT_WINDOW_CHARS",
                defaults.context_window_chars,
            )?,
            max_tasks: env_or("JOB_MATCHER_MAX_TASKS", defaults.max_tasks)?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> MatcherResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| MatcherError::Config(format!("{}={:?}: {}", key, value, e))),
        Err(_) => Ok(default),
    }
}
