//! CLI for running the matcher against a catalog file
//!
//! Usage:
//!   cargo run --features cli --bin detect_job -- -c catalog.yaml -t "my tap keeps dripping"
//!   cargo run --features cli --bin detect_job -- -c catalog.yaml --multi -t "fix the tap and hang two shelves"
//!   cargo run --features cli --bin detect_job -- -c catalog.yaml --no-llm --client-type commercial -t "..."

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use job_matcher::{CallerProfile, ClientType, DetectOptions, FileCatalogStore, JobMatcher};

#[derive(Parser)]
#[command(name = "detect_job")]
#[command(about = "Match a job description against the service catalog")]
struct Args {
    /// Catalog file (JSON or YAML)
    #[arg(short = 'c', long, env = "JOB_MATCHER_CATALOG")]
    catalog: PathBuf,

    /// Job description as the customer said it
    #[arg(short = 't', long)]
    text: String,

    /// Decompose into several tasks and aggregate
    #[arg(short = 'm', long)]
    multi: bool,

    /// Declared client type
    #[arg(long, value_enum)]
    client_type: Option<ClientType>,

    /// Caller is elderly or otherwise vulnerable
    #[arg(long)]
    elderly: bool,

    /// Caller cannot use video or messaging
    #[arg(long)]
    technology_averse: bool,

    /// Skip the vector stage
    #[arg(long)]
    no_vector: bool,

    /// Skip the LLM stage
    #[arg(long)]
    no_llm: bool,

    /// Pretty-print the JSON result
    #[arg(short = 'p', long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let store = Arc::new(FileCatalogStore::new(args.catalog.clone()));
    let matcher = JobMatcher::from_env(store).context("Failed to configure matcher")?;

    let loaded = matcher
        .catalog()
        .refresh()
        .await
        .with_context(|| format!("Failed to load catalog {}", args.catalog.display()))?;
    tracing::info!(services = loaded, "Catalog loaded");

    let options = DetectOptions {
        client_type: args.client_type,
        caller: CallerProfile {
            elderly: args.elderly,
            technology_averse: args.technology_averse,
        },
        history: Vec::new(),
        skip_vector: args.no_vector,
        skip_llm: args.no_llm,
    };

    let output = if args.multi {
        let result = matcher
            .detect_multi_task_with_options(&args.text, &options)
            .await;
        to_json(&result, args.pretty)?
    } else {
        let result = matcher.detect(&args.text, &options).await;
        to_json(&result, args.pretty)?
    };

    println!("{}", output);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}
