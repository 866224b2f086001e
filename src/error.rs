//! Error types for the matching engine
//!
//! None of these escape the public `detect*` operations: every stage
//! recovers locally and logs. They exist so stages and stores can report
//! *why* they fell back.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector search failed: {0}")]
    VectorSearch(String),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("Malformed model output: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type MatcherResult<T> = Result<T, MatcherError>;
