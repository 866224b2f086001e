//! Job Matcher
//!
//! Turns a customer's free-text description of household work into a match
//! against a fixed-price service catalog and a routing decision: quote
//! instantly, ask for a video, or send someone round.
//!
//! # Architecture
//!
//! ```text
//! Utterance
//!       │
//!       ├──────────────────────────────┐
//!       ▼                              ▼
//! ┌──────────────────────┐   ┌──────────────────────────┐
//! │  Speculative lexical │   │  Task Decomposer (LLM)   │
//! │  scan (full text)    │   │  "tap and two shelves"   │
//! └──────────────────────┘   │  → [tap ×1, shelf ×2]    │
//!       │                    └──────────────────────────┘
//!       ├── score ≥ 85, single job ──► one task, instant price
//!       ▼                              │
//!       per task (concurrently) ◄──────┘
//! ┌─────────────────────────────────────────┐
//! │  Safety gate      hazard / commercial / │──► site visit
//! │                   vulnerable caller     │
//! ├─────────────────────────────────────────┤
//! │  Lexical          ≥ 80 instant price    │
//! │                   ≥ 65 video quote      │
//! ├─────────────────────────────────────────┤
//! │  Vector           pgvector <=>, cosine  │──► ≥ 0.85 instant price
//! │                   fallback, > 0.60      │
//! ├─────────────────────────────────────────┤
//! │  LLM              shortlist ≤ 8,        │──► > 75 instant price
//! │                   forced tool call      │
//! └─────────────────────────────────────────┘
//!       │ nothing conclusive ──► video quote
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Route aggregator  worst case wins,     │
//! │  price × quantity for matched lines     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use job_matcher::{DetectOptions, FileCatalogStore, JobMatcher};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Arc::new(FileCatalogStore::new("catalog.yaml"));
//! let matcher = JobMatcher::from_env(store)?;
//!
//! let result = matcher
//!     .detect("my kitchen tap keeps dripping", &DetectOptions::default())
//!     .await;
//! println!("{} -> {}", result.route, result.rationale);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod context;
pub mod decompose;
pub mod disambiguate;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod lexical;
pub mod llm;
pub mod safety;
pub mod strategy;
pub mod text;
pub mod types;

pub use catalog::{CatalogCache, CatalogStore, FileCatalogStore, InMemoryCatalogStore};
pub use config::{thresholds, MatcherConfig};
pub use context::{ContextRegistry, InteractionContext, Utterance};
pub use embedding::{EmbeddingProvider, VectorHit, VectorStore};
pub use engine::{JobMatcher, JobMatcherBuilder};
pub use error::{MatcherError, MatcherResult};
pub use lexical::{LexicalMatcher, SynonymTable};
pub use llm::{LlmBackend, LlmClient};
pub use safety::{SafetyAssessment, SafetyFlag, SafetyGate};
pub use types::*;

#[cfg(feature = "database")]
pub use catalog::postgres::{PgCatalogStore, PgVectorStore};
