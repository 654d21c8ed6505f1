//! Shared handle to the configured vector index.
//!
//! Built once at startup and passed by reference to ingestion and retrieval.
//! Writes take the write side of the gate and queries the read side, so an
//! ingestion batch is never observed half-applied by a concurrent query.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::vector_store::{CollectionInfo, CollectionSchema, VectorStore, create_backend};
use crate::error::VectorStoreError;
use crate::models::{Config, IndexEntry, SearchResult};

pub struct IndexHandle {
    store: Arc<dyn VectorStore>,
    gate: RwLock<()>,
}

impl IndexHandle {
    /// Connect to the configured backend and make sure the collection exists
    /// with the expected schema.
    pub async fn open(config: &Config) -> Result<Self, VectorStoreError> {
        let handle = Self::connect(config).await?;
        handle.store.ensure_collection().await?;
        Ok(handle)
    }

    /// Connect without creating or verifying the collection.
    pub async fn connect(config: &Config) -> Result<Self, VectorStoreError> {
        let store = create_backend(&config.vector_store, schema_from_config(config)).await?;
        Ok(Self::from_store(Arc::from(store)))
    }

    pub fn from_store(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            gate: RwLock::new(()),
        }
    }

    /// Wrap `store` and ensure its collection.
    pub async fn with_store(store: Arc<dyn VectorStore>) -> Result<Self, VectorStoreError> {
        store.ensure_collection().await?;
        Ok(Self::from_store(store))
    }

    pub fn schema(&self) -> &CollectionSchema {
        self.store.schema()
    }

    pub async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.store.health_check().await
    }

    pub async fn info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let _guard = self.gate.read().await;
        self.store.get_collection_info().await
    }

    pub async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), VectorStoreError> {
        let _guard = self.gate.write().await;
        self.store.upsert(entries).await
    }

    pub async fn query(
        &self,
        vector: Vec<f32>,
        k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let _guard = self.gate.read().await;
        self.store.query(vector, k).await
    }

    /// Drop every entry and recreate the collection with the configured schema.
    pub async fn reset(&self) -> Result<(), VectorStoreError> {
        let _guard = self.gate.write().await;
        self.store.clear_collection().await?;
        tracing::info!(collection = %self.schema().name, "collection reset");
        Ok(())
    }
}

/// Collection schema implied by the embedding and vector store settings.
pub fn schema_from_config(config: &Config) -> CollectionSchema {
    CollectionSchema::new(
        config.vector_store.collection.clone(),
        config.embedding.dimension as usize,
        config.vector_store.metric,
        config.embedding.model_id.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DistanceMetric, Metadata, VectorDriver};

    fn local_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.vector_store.driver = VectorDriver::Local;
        config.vector_store.path = Some(dir.join("index.db"));
        config.embedding.dimension = 2;
        config.embedding.model_id = "hash".to_string();
        config
    }

    #[test]
    fn test_schema_from_config() {
        let schema = schema_from_config(&Config::default());
        assert_eq!(schema.name, "documents");
        assert_eq!(schema.dimension, 384);
        assert_eq!(schema.metric, DistanceMetric::Cosine);
        assert_eq!(schema.embedding_model, "sentence-transformers/all-MiniLM-L6-v2");
    }

    #[tokio::test]
    async fn test_open_creates_collection() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());

        let handle = IndexHandle::connect(&config).await.unwrap();
        assert!(handle.info().await.unwrap().is_none());

        let handle = IndexHandle::open(&config).await.unwrap();
        let info = handle.info().await.unwrap().unwrap();
        assert_eq!(info.points_count, 0);
        assert_eq!(info.dimension, Some(2));
    }

    #[tokio::test]
    async fn test_open_fails_fast_on_dimension_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_config(dir.path());
        IndexHandle::open(&config).await.unwrap();

        config.embedding.dimension = 3;
        assert!(matches!(
            IndexHandle::open(&config).await,
            Err(VectorStoreError::SchemaMismatch { .. })
        ));

        // Reset recreates the collection with the new schema
        let handle = IndexHandle::connect(&config).await.unwrap();
        handle.reset().await.unwrap();
        IndexHandle::open(&config).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_ingest_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let handle = Arc::new(IndexHandle::open(&local_config(dir.path())).await.unwrap());

        let writer = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                for i in 0..20 {
                    let entry = IndexEntry {
                        id: format!("e{i}"),
                        content: format!("entry {i}"),
                        metadata: Metadata::new(),
                        vector: vec![1.0, i as f32],
                    };
                    handle.upsert(vec![entry]).await.unwrap();
                }
            })
        };
        let reader = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                for _ in 0..20 {
                    let results = handle.query(vec![1.0, 0.0], 5).await.unwrap();
                    assert!(results.len() <= 5);
                }
            })
        };
        writer.await.unwrap();
        reader.await.unwrap();

        let info = handle.info().await.unwrap().unwrap();
        assert_eq!(info.points_count, 20);
    }
}
