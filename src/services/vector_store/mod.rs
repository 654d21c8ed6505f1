//! Vector index abstraction layer.
//!
//! A collection is a named container of index entries that share one vector
//! dimension, one distance metric and one embedding model. Backends (local
//! SQLite file, Qdrant, PostgreSQL/pgvector) implement [`VectorStore`] and are
//! selected by configuration.

mod local;
mod pgvector;
mod qdrant;

pub use local::LocalBackend;
pub use pgvector::PgVectorBackend;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VectorStoreError;
use crate::models::{DistanceMetric, IndexEntry, SearchResult, VectorDriver, VectorStoreConfig};

/// Identity of a collection. Everything but the name must match what is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub embedding_model: String,
}

impl CollectionSchema {
    pub fn new(
        name: impl Into<String>,
        dimension: usize,
        metric: DistanceMetric,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
            embedding_model: embedding_model.into(),
        }
    }
}

/// Collection state as reported by a backend. Schema fields are `None` when the
/// backend cannot report them.
#[derive(Debug, Clone, Default)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub dimension: Option<usize>,
    pub metric: Option<DistanceMetric>,
    pub embedding_model: Option<String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Current state of the collection, or `None` if it does not exist.
    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError>;

    /// Create the collection if absent. An existing collection must match the
    /// configured schema, otherwise `SchemaMismatch` is returned.
    async fn ensure_collection(&self) -> Result<(), VectorStoreError>;

    /// Store entries. Entries with a new id are appended; an existing id is
    /// replaced. Every vector must have the collection dimension.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), VectorStoreError>;

    /// Up to `k` nearest entries, most relevant first. An empty collection
    /// yields an empty result.
    async fn query(&self, vector: Vec<f32>, k: usize)
    -> Result<Vec<SearchResult>, VectorStoreError>;

    /// Drop every entry and recreate the collection with the configured schema.
    async fn clear_collection(&self) -> Result<(), VectorStoreError>;

    /// Schema this backend was opened with.
    fn schema(&self) -> &CollectionSchema;

    fn collection(&self) -> &str {
        &self.schema().name
    }
}

/// Create the backend selected by `config` for `schema`.
pub async fn create_backend(
    config: &VectorStoreConfig,
    schema: CollectionSchema,
) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    match config.driver {
        VectorDriver::Local => {
            let path = config.local_path().ok_or_else(|| {
                VectorStoreError::ConnectionError(
                    "could not determine local index path".to_string(),
                )
            })?;
            Ok(Box::new(LocalBackend::open(&path, schema)?))
        }
        VectorDriver::Qdrant => Ok(Box::new(QdrantBackend::new(config, schema)?)),
        VectorDriver::PostgreSQL => Ok(Box::new(PgVectorBackend::new(config, schema).await?)),
    }
}

/// Compare a stored collection against the configured schema.
pub fn verify_schema(
    expected: &CollectionSchema,
    info: &CollectionInfo,
) -> Result<(), VectorStoreError> {
    let mismatch = |field: &'static str, stored: String, configured: String| {
        Err(VectorStoreError::SchemaMismatch {
            collection: expected.name.clone(),
            field,
            stored,
            configured,
        })
    };

    if let Some(dimension) = info.dimension
        && dimension != expected.dimension
    {
        return mismatch("dimension", dimension.to_string(), expected.dimension.to_string());
    }
    if let Some(metric) = info.metric
        && metric != expected.metric
    {
        return mismatch("metric", metric.to_string(), expected.metric.to_string());
    }
    if let Some(ref model) = info.embedding_model
        && *model != expected.embedding_model
    {
        return mismatch(
            "embedding_model",
            model.clone(),
            expected.embedding_model.clone(),
        );
    }
    Ok(())
}

/// Reject any entry whose vector length differs from `dimension`.
pub fn validate_entries(entries: &[IndexEntry], dimension: usize) -> Result<(), VectorStoreError> {
    match entries.iter().find(|e| e.vector.len() != dimension) {
        Some(entry) => Err(VectorStoreError::DimensionMismatch {
            expected: dimension,
            actual: entry.vector.len(),
        }),
        None => Ok(()),
    }
}

pub fn validate_query_vector(vector: &[f32], dimension: usize) -> Result<(), VectorStoreError> {
    if vector.len() != dimension {
        return Err(VectorStoreError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}
