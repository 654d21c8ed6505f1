use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;

use super::{
    CollectionInfo, CollectionSchema, VectorStore, validate_entries, validate_query_vector,
    verify_schema,
};
use crate::error::VectorStoreError;
use crate::models::{
    DistanceMetric, IndexEntry, Metadata, SearchResult, VectorStoreConfig, sanitize_identifier,
};

/// Table recording the schema of every collection table.
const REGISTRY_TABLE: &str = "docrag_collections";

pub struct PgVectorBackend {
    pool: PgPool,
    table_name: String,
    bare_table_name: String,
    registry_table: String,
    pg_schema: Option<String>,
    schema: CollectionSchema,
}

impl PgVectorBackend {
    pub async fn new(
        config: &VectorStoreConfig,
        schema: CollectionSchema,
    ) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        let pg_schema = config.schema.as_deref().map(sanitize_identifier);
        let registry_table = match pg_schema {
            Some(ref s) => format!("{}.{}", s, REGISTRY_TABLE),
            None => REGISTRY_TABLE.to_string(),
        };

        let backend = Self {
            pool,
            table_name: config.qualified_table_name(),
            bare_table_name: sanitize_identifier(&schema.name),
            registry_table,
            pg_schema,
            schema,
        };

        backend.check_pgvector_extension().await?;

        if let Some(ref pg_schema) = backend.pg_schema {
            backend.ensure_schema(pg_schema).await?;
        }
        backend.ensure_registry().await?;

        Ok(backend)
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn ensure_schema(&self, pg_schema: &str) -> Result<(), VectorStoreError> {
        let query = format!("CREATE SCHEMA IF NOT EXISTS {}", pg_schema);
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;
        Ok(())
    }

    async fn ensure_registry(&self) -> Result<(), VectorStoreError> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL,
                embedding_model TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            self.registry_table
        );
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;
        Ok(())
    }

    async fn create_collection(&self) -> Result<(), VectorStoreError> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            self.table_name, self.schema.dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding {})",
            self.bare_table_name,
            self.table_name,
            operator_class(self.schema.metric)
        );
        sqlx::query(&create_index)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        let register = format!(
            r#"
            INSERT INTO {} (name, dimension, metric, embedding_model, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE SET
                dimension = EXCLUDED.dimension,
                metric = EXCLUDED.metric,
                embedding_model = EXCLUDED.embedding_model,
                created_at = EXCLUDED.created_at
            "#,
            self.registry_table
        );
        sqlx::query(&register)
            .bind(&self.schema.name)
            .bind(self.schema.dimension as i32)
            .bind(self.schema.metric.to_string())
            .bind(&self.schema.embedding_model)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        tracing::info!(
            table = %self.table_name,
            dimension = self.schema.dimension,
            metric = %self.schema.metric,
            "created pgvector collection"
        );
        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let table_exists: Option<(String,)> = sqlx::query_as(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_name = $1 AND table_schema = COALESCE($2::text, current_schema()::text)",
        )
        .bind(&self.bare_table_name)
        .bind(&self.pg_schema)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if table_exists.is_none() {
            return Ok(None);
        }

        let query = format!("SELECT COUNT(*) as count FROM {}", self.table_name);
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        let query = format!(
            "SELECT dimension, metric, embedding_model FROM {} WHERE name = $1",
            self.registry_table
        );
        let registered: Option<(i32, String, String)> = sqlx::query_as(&query)
            .bind(&self.schema.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        let mut info = CollectionInfo {
            points_count: row.0 as u64,
            ..Default::default()
        };
        if let Some((dimension, metric, embedding_model)) = registered {
            info.dimension = Some(dimension as usize);
            info.metric = metric.parse().ok();
            info.embedding_model = Some(embedding_model);
        }
        Ok(Some(info))
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        match self.get_collection_info().await? {
            Some(info) => verify_schema(&self.schema, &info),
            None => self.create_collection().await,
        }
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), VectorStoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        validate_entries(&entries, self.schema.dimension)?;

        let query = format!(
            r#"
            INSERT INTO {} (id, content, metadata, embedding, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                content = EXCLUDED.content,
                metadata = EXCLUDED.metadata,
                embedding = EXCLUDED.embedding,
                created_at = EXCLUDED.created_at
            "#,
            self.table_name
        );

        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        for entry in entries {
            let id = uuid::Uuid::parse_str(&entry.id)
                .map_err(|e| VectorStoreError::UpsertError(format!("Invalid UUID: {}", e)))?;
            let metadata = serde_json::to_string(&entry.metadata)
                .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
            let embedding = Vector::from(entry.vector);

            sqlx::query(&query)
                .bind(id)
                .bind(&entry.content)
                .bind(&metadata)
                .bind(&embedding)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        validate_query_vector(&vector, self.schema.dimension)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = Vector::from(vector);
        let (score_expr, order_expr) = score_expressions(self.schema.metric);
        let query = format!(
            r#"
            SELECT
                id::text as chunk_id,
                ({}) as score,
                content,
                metadata
            FROM {}
            ORDER BY {}
            LIMIT {}
            "#,
            score_expr, self.table_name, order_expr, k
        );

        let rows = sqlx::query(&query)
            .bind(&embedding)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        rows.into_iter()
            .map(|row: PgRow| {
                let score: f64 = row.get("score");
                let metadata: String = row.get("metadata");
                let metadata: Metadata = serde_json::from_str(&metadata)
                    .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

                Ok(SearchResult {
                    chunk_id: row.get("chunk_id"),
                    score: score as f32,
                    content: row.get("content"),
                    metadata,
                })
            })
            .collect()
    }

    async fn clear_collection(&self) -> Result<(), VectorStoreError> {
        let drop_table = format!("DROP TABLE IF EXISTS {}", self.table_name);
        sqlx::query(&drop_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        let unregister = format!("DELETE FROM {} WHERE name = $1", self.registry_table);
        sqlx::query(&unregister)
            .bind(&self.schema.name)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        self.create_collection().await
    }

    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }
}

fn operator_class(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "vector_cosine_ops",
        DistanceMetric::Euclid => "vector_l2_ops",
        DistanceMetric::Dot => "vector_ip_ops",
    }
}

/// Score and ordering expressions against the bound query vector `$1`.
/// `<#>` yields the negated inner product.
fn score_expressions(metric: DistanceMetric) -> (&'static str, &'static str) {
    match metric {
        DistanceMetric::Cosine => ("1 - (embedding <=> $1)", "embedding <=> $1"),
        DistanceMetric::Euclid => ("embedding <-> $1", "embedding <-> $1"),
        DistanceMetric::Dot => ("(embedding <#> $1) * -1", "embedding <#> $1"),
    }
}
