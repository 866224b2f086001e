//! Populate service catalog embeddings
//!
//! Reads active services from `service_catalog`, embeds the ones without a
//! vector and writes the vectors back, so the matcher can use pgvector's
//! native similarity search.
//!
//! Run with:
//!   DATABASE_URL="postgresql:///jobs" cargo run --features cli,database --bin populate_service_embeddings
//!
//! Options:
//!   --force        Re-embed every active service
//!   --batch-size   Services per embedding request (default 64)

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use job_matcher::embedding::{create_embedding_provider, vector};
use job_matcher::PgCatalogStore;

#[derive(Parser)]
#[command(name = "populate_service_embeddings")]
#[command(about = "Embed catalog services and store their vectors")]
struct Args {
    /// Re-embed services that already have a vector
    #[arg(long)]
    force: bool,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if args.force {
        info!("--force: Will re-embed all active services");
    }

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to database");

    let store = PgCatalogStore::new(pool);
    let provider = create_embedding_provider().context("Failed to configure embeddings")?;
    info!(
        model = provider.model_name(),
        dim = provider.dimension(),
        "Embedding provider ready"
    );

    let services = store
        .services_missing_embeddings(args.force)
        .await
        .context("Failed to fetch services")?;
    if services.is_empty() {
        info!("All active services already have embeddings. Nothing to do.");
        return Ok(());
    }

    let batch_size = args.batch_size.max(1);
    let total_batches = services.len().div_ceil(batch_size);
    info!(
        "Processing {} services in {} batches of {}...",
        services.len(),
        total_batches,
        batch_size
    );

    let start_time = std::time::Instant::now();
    let mut written = 0usize;

    for (batch_idx, chunk) in services.chunks(batch_size).enumerate() {
        // Services are documents, not queries
        let texts: Vec<String> = chunk.iter().map(|s| s.embedding_text()).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = provider
            .embed_documents(&refs)
            .await
            .with_context(|| format!("Failed to embed batch {}", batch_idx + 1))?;

        for (service, embedding) in chunk.iter().zip(embeddings) {
            if !vector::is_usable(&embedding) {
                warn!(code = %service.code, "Skipping unusable vector");
                continue;
            }
            store
                .update_embedding(&service.code, vector::normalize(embedding))
                .await
                .with_context(|| format!("Failed to store embedding for {}", service.code))?;
            written += 1;
        }

        info!("Batch {}/{} done", batch_idx + 1, total_batches);
    }

    info!(
        "Stored {} embeddings in {:.1}s",
        written,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
