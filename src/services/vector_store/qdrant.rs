//! Qdrant vector store backend implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, Struct, UpsertPointsBuilder, Value,
    VectorParamsBuilder, vectors_config,
};

use super::{
    CollectionInfo, CollectionSchema, VectorStore, validate_entries, validate_query_vector,
    verify_schema,
};
use crate::error::VectorStoreError;
use crate::models::{DistanceMetric, IndexEntry, Metadata, SearchResult, VectorStoreConfig};

const CONTENT_FIELD: &str = "content";
const METADATA_FIELD: &str = "metadata";
const MODEL_FIELD: &str = "embedding_model";

/// Qdrant vector store backend.
pub struct QdrantBackend {
    client: Qdrant,
    schema: CollectionSchema,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig, schema: CollectionSchema) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self { client, schema })
    }

    /// Qdrant keeps no collection-level metadata, so the model id is read back
    /// from the payload of any stored point.
    async fn stored_model(&self) -> Result<Option<String>, VectorStoreError> {
        let scroll = ScrollPointsBuilder::new(&self.schema.name)
            .limit(1)
            .with_payload(true)
            .with_vectors(false);

        let response = self
            .client
            .scroll(scroll)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(response
            .result
            .first()
            .and_then(|point| point.payload.get(MODEL_FIELD))
            .and_then(string_value))
    }

    async fn create_collection(&self) -> Result<(), VectorStoreError> {
        let create = CreateCollectionBuilder::new(&self.schema.name).vectors_config(
            VectorParamsBuilder::new(self.schema.dimension as u64, to_distance(self.schema.metric)),
        );

        self.client
            .create_collection(create)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        tracing::info!(
            collection = %self.schema.name,
            dimension = self.schema.dimension,
            metric = %self.schema.metric,
            "created qdrant collection"
        );
        Ok(())
    }

    fn to_point(&self, entry: IndexEntry) -> PointStruct {
        let metadata: HashMap<String, Value> = entry
            .metadata
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();

        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(CONTENT_FIELD.to_string(), entry.content.into());
        payload.insert(
            METADATA_FIELD.to_string(),
            Value {
                kind: Some(Kind::StructValue(Struct { fields: metadata })),
            },
        );
        payload.insert(
            MODEL_FIELD.to_string(),
            self.schema.embedding_model.clone().into(),
        );

        PointStruct::new(entry.id, entry.vector, payload)
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.schema.name)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;
        if !exists {
            return Ok(None);
        }

        let info = self
            .client
            .collection_info(&self.schema.name)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        let result = info.result;
        let points_count = result.as_ref().map_or(0, |r| r.points_count.unwrap_or(0));
        let params = result
            .as_ref()
            .and_then(|r| r.config.as_ref())
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .and_then(|config| match config {
                vectors_config::Config::Params(params) => Some(params.clone()),
                _ => None,
            });

        let embedding_model = if points_count > 0 {
            self.stored_model().await?
        } else {
            None
        };

        Ok(Some(CollectionInfo {
            points_count,
            dimension: params.as_ref().map(|p| p.size as usize),
            metric: params.and_then(|p| from_distance(p.distance)),
            embedding_model,
        }))
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

        let count = entries.len();
        let points: Vec<PointStruct> = entries.into_iter().map(|e| self.to_point(e)).collect();
        let upsert = UpsertPointsBuilder::new(&self.schema.name, points).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        tracing::debug!(count, collection = %self.schema.name, "upserted points");
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

        let search = SearchPointsBuilder::new(&self.schema.name, vector, k as u64).with_payload(true);

        let results = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| {
                let payload = point.payload;
                let content = payload
                    .get(CONTENT_FIELD)
                    .and_then(string_value)
                    .unwrap_or_default();
                let metadata = payload
                    .get(METADATA_FIELD)
                    .map(metadata_value)
                    .unwrap_or_default();

                SearchResult {
                    chunk_id: point.id.as_ref().map(point_id_string).unwrap_or_default(),
                    score: point.score,
                    content,
                    metadata,
                }
            })
            .collect())
    }

    async fn clear_collection(&self) -> Result<(), VectorStoreError> {
        if self.get_collection_info().await?.is_some() {
            self.client
                .delete_collection(&self.schema.name)
                .await
                .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        }

        self.create_collection().await
    }

    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }
}

fn to_distance(metric: DistanceMetric) -> Distance {
    match metric {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Euclid => Distance::Euclid,
        DistanceMetric::Dot => Distance::Dot,
    }
}

fn from_distance(raw: i32) -> Option<DistanceMetric> {
    match Distance::try_from(raw).ok()? {
        Distance::Cosine => Some(DistanceMetric::Cosine),
        Distance::Euclid => Some(DistanceMetric::Euclid),
        Distance::Dot => Some(DistanceMetric::Dot),
        _ => None,
    }
}

fn string_value(value: &Value) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn metadata_value(value: &Value) -> Metadata {
    match &value.kind {
        Some(Kind::StructValue(s)) => s
            .fields
            .iter()
            .filter_map(|(k, v)| string_value(v).map(|v| (k.clone(), v)))
            .collect(),
        _ => Metadata::new(),
    }
}

fn point_id_string(id: &PointId) -> String {
    match &id.point_id_options {
        Some(PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}
