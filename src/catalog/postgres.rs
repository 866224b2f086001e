//! PostgreSQL catalog and pgvector similarity store
//!
//! Schema lives in `migrations/0001_service_catalog.sql`.

use async_trait::async_trait;
use pgvector::Vector;
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::CatalogStore;
use crate::embedding::{VectorHit, VectorStore};
use crate::error::MatcherResult;
use crate::types::Service;

#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    code: String,
    name: String,
    description: Option<String>,
    price: Decimal,
    estimated_minutes: i32,
    keywords: Vec<String>,
    negative_keywords: Vec<String>,
    embedding: Option<Vector>,
    category: String,
    is_active: bool,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            code: row.code,
            name: row.name,
            description: row.description.unwrap_or_default(),
            price: row.price,
            estimated_minutes: row.estimated_minutes.max(0) as u32,
            keywords: row.keywords,
            negative_keywords: row.negative_keywords,
            embedding: row.embedding.map(|v| v.to_vec()),
            category: row.category,
            is_active: row.is_active,
        }
    }
}

const SELECT_SERVICES: &str = r#"
    SELECT code, name, description, price, estimated_minutes,
           COALESCE(keywords, '{}') AS keywords,
           COALESCE(negative_keywords, '{}') AS negative_keywords,
           embedding,
           COALESCE(category, 'general') AS category,
           is_active
    FROM service_catalog
"#;

/// Catalog rows from `service_catalog`
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Active services without a vector, or every active service when `force`
    pub async fn services_missing_embeddings(&self, force: bool) -> MatcherResult<Vec<Service>> {
        let sql = format!(
            "{} WHERE is_active AND (embedding IS NULL OR $1) ORDER BY code",
            SELECT_SERVICES
        );
        let rows = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(force)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Service::from).collect())
    }

    /// Write back a service's vector
    pub async fn update_embedding(&self, code: &str, embedding: Vec<f32>) -> MatcherResult<()> {
        sqlx::query("UPDATE service_catalog SET embedding = $2, updated_at = now() WHERE code = $1")
            .bind(code)
            .bind(Vector::from(embedding))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn fetch_active_services(&self) -> MatcherResult<Vec<Service>> {
        let sql = format!("{} WHERE is_active ORDER BY code", SELECT_SERVICES);
        let rows = sqlx::query_as::<_, ServiceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Service::from).collect())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

/// Native nearest-neighbour search with pgvector's cosine distance
pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> MatcherResult<Vec<VectorHit>> {
        let embedding_vec = Vector::from(query.to_vec());

        let rows = sqlx::query_as::<_, (String, f64)>(
            r#"
            SELECT code, 1 - (embedding <=> $1::vector) AS similarity
            FROM service_catalog
            WHERE is_active
              AND embedding IS NOT NULL
              AND 1 - (embedding <=> $1::vector) > $2
            ORDER BY embedding <=> $1::vector, code
            LIMIT $3
            "#,
        )
        .bind(&embedding_vec)
        .bind(min_similarity as f64)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(code, similarity)| VectorHit {
                code,
                similarity: similarity as f32,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "pgvector"
    }
}
