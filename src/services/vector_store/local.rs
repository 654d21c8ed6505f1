//! Single-file vector index backed by SQLite.
//!
//! Vectors are stored as little-endian `f32` blobs and searched by brute force,
//! which is plenty for a personal document folder.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::{
    CollectionInfo, CollectionSchema, VectorStore, validate_entries, validate_query_vector,
    verify_schema,
};
use crate::error::VectorStoreError;
use crate::models::{IndexEntry, Metadata, SearchResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL,
    metric TEXT NOT NULL,
    embedding_model TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    vector BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_entries_collection ON entries(collection);
"#;

pub struct LocalBackend {
    conn: Mutex<Connection>,
    schema: CollectionSchema,
}

impl LocalBackend {
    /// Open (or create) the index file at `path`.
    pub fn open(path: &Path, schema: CollectionSchema) -> Result<Self, VectorStoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(path = %path.display(), collection = %schema.name, "opened local index");
        Ok(Self {
            conn: Mutex::new(conn),
            schema,
        })
    }

    /// Index that lives only as long as the process.
    pub fn in_memory(schema: CollectionSchema) -> Result<Self, VectorStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            schema,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, VectorStoreError> {
        self.conn
            .lock()
            .map_err(|_| VectorStoreError::ConnectionError("index lock poisoned".to_string()))
    }

    fn read_info(conn: &Connection, name: &str) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let row = conn
            .query_row(
                "SELECT dimension, metric, embedding_model FROM collections WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((dimension, metric, embedding_model)) = row else {
            return Ok(None);
        };

        let points_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE collection = ?1",
            params![name],
            |row| row.get(0),
        )?;

        let metric = metric
            .parse()
            .map_err(|e: String| VectorStoreError::CollectionError(e))?;

        Ok(Some(CollectionInfo {
            points_count: points_count as u64,
            dimension: Some(dimension as usize),
            metric: Some(metric),
            embedding_model: Some(embedding_model),
        }))
    }

    fn create(conn: &Connection, schema: &CollectionSchema) -> Result<(), VectorStoreError> {
        conn.execute(
            "INSERT INTO collections (name, dimension, metric, embedding_model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                schema.name,
                schema.dimension as i64,
                schema.metric.to_string(),
                schema.embedding_model,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        tracing::info!(
            collection = %schema.name,
            dimension = schema.dimension,
            metric = %schema.metric,
            "created collection"
        );
        Ok(())
    }

    fn require_collection(&self, conn: &Connection) -> Result<(), VectorStoreError> {
        match Self::read_info(conn, &self.schema.name)? {
            Some(info) => verify_schema(&self.schema, &info),
            None => Err(VectorStoreError::MissingCollection(self.schema.name.clone())),
        }
    }
}

#[async_trait]
impl VectorStore for LocalBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(true)
    }

    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let conn = self.lock()?;
        Self::read_info(&conn, &self.schema.name)
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        let conn = self.lock()?;
        match Self::read_info(&conn, &self.schema.name)? {
            Some(info) => verify_schema(&self.schema, &info),
            None => Self::create(&conn, &self.schema),
        }
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), VectorStoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        validate_entries(&entries, self.schema.dimension)?;

        let mut conn = self.lock()?;
        self.require_collection(&conn)?;

        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO entries (collection, id, content, metadata, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in &entries {
                let metadata = serde_json::to_string(&entry.metadata)
                    .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
                stmt.execute(params![
                    self.schema.name,
                    entry.id,
                    entry.content,
                    metadata,
                    encode_vector(&entry.vector),
                    now,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(count = entries.len(), collection = %self.schema.name, "upserted entries");
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

        let conn = self.lock()?;
        self.require_collection(&conn)?;

        let metric = self.schema.metric;
        let mut stmt =
            conn.prepare("SELECT id, content, metadata, vector FROM entries WHERE collection = ?1")?;
        let rows = stmt.query_map(params![self.schema.name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, content, metadata, blob) = row?;
            let stored = decode_vector(&blob)?;
            let metadata: Metadata = serde_json::from_str(&metadata)
                .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;
            results.push(SearchResult {
                chunk_id: id,
                score: metric.score(&vector, &stored),
                content,
                metadata,
            });
        }

        // Ties keep a stable order by id so repeated queries agree
        results.sort_by(|a, b| {
            metric
                .rank(a.score, b.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(k);
        Ok(results)
    }

    async fn clear_collection(&self) -> Result<(), VectorStoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM entries WHERE collection = ?1",
            params![self.schema.name],
        )
        .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        tx.execute(
            "DELETE FROM collections WHERE name = ?1",
            params![self.schema.name],
        )
        .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        Self::create(&tx, &self.schema)?;
        tx.commit()?;
        Ok(())
    }

    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, VectorStoreError> {
    if bytes.len() % 4 != 0 {
        return Err(VectorStoreError::SearchError(format!(
            "corrupt vector blob of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DistanceMetric, SOURCE_KEY};

    fn schema(metric: DistanceMetric) -> CollectionSchema {
        CollectionSchema::new("docs", 3, metric, "test-model")
    }

    fn entry(id: &str, vector: Vec<f32>) -> IndexEntry {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), format!("{id}.txt"));
        IndexEntry {
            id: id.to_string(),
            content: format!("content of {id}"),
            metadata,
            vector,
        }
    }

    async fn populated(metric: DistanceMetric) -> LocalBackend {
        let backend = LocalBackend::in_memory(schema(metric)).unwrap();
        backend.ensure_collection().await.unwrap();
        backend
            .upsert(vec![
                entry("a", vec![1.0, 0.0, 0.0]),
                entry("b", vec![0.7, 0.7, 0.0]),
                entry("c", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();
        backend
    }

    #[test]
    fn test_vector_blob_encoding() {
        let v = vec![1.5, -0.25, 0.0];
        assert_eq!(decode_vector(&encode_vector(&v)).unwrap(), v);
        assert!(decode_vector(&[0, 1, 2]).is_err());
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let backend = LocalBackend::in_memory(schema(DistanceMetric::Cosine)).unwrap();
        assert!(backend.get_collection_info().await.unwrap().is_none());

        backend.ensure_collection().await.unwrap();
        backend.ensure_collection().await.unwrap();

        let info = backend.get_collection_info().await.unwrap().unwrap();
        assert_eq!(info.points_count, 0);
        assert_eq!(info.dimension, Some(3));
        assert_eq!(info.metric, Some(DistanceMetric::Cosine));
        assert_eq!(info.embedding_model.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_reopen_with_conflicting_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        let backend = LocalBackend::open(&path, schema(DistanceMetric::Cosine)).unwrap();
        backend.ensure_collection().await.unwrap();
        drop(backend);

        let wider = CollectionSchema::new("docs", 768, DistanceMetric::Cosine, "test-model");
        let backend = LocalBackend::open(&path, wider).unwrap();
        assert!(matches!(
            backend.ensure_collection().await,
            Err(VectorStoreError::SchemaMismatch {
                field: "dimension",
                ..
            })
        ));

        let other_model = CollectionSchema::new("docs", 3, DistanceMetric::Cosine, "other");
        let backend = LocalBackend::open(&path, other_model).unwrap();
        assert!(matches!(
            backend.ensure_collection().await,
            Err(VectorStoreError::SchemaMismatch {
                field: "embedding_model",
                ..
            })
        ));

        // A different collection name in the same file is independent
        let other_name = CollectionSchema::new("notes", 768, DistanceMetric::Dot, "other");
        let backend = LocalBackend::open(&path, other_name).unwrap();
        backend.ensure_collection().await.unwrap();
    }

    #[tokio::test]
    async fn test_entries_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.db");

        let backend = LocalBackend::open(&path, schema(DistanceMetric::Cosine)).unwrap();
        backend.ensure_collection().await.unwrap();
        backend
            .upsert(vec![entry("a", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        drop(backend);

        let backend = LocalBackend::open(&path, schema(DistanceMetric::Cosine)).unwrap();
        let results = backend.query(vec![1.0, 0.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source(), "a.txt");
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity_and_respects_k() {
        let backend = populated(DistanceMetric::Cosine).await;

        let results = backend.query(vec![1.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "a");
        assert_eq!(results[1].chunk_id, "b");
        assert!(results[0].score >= results[1].score);

        let all = backend.query(vec![1.0, 0.1, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].chunk_id, "c");

        assert!(backend.query(vec![1.0, 0.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_euclid_ranks_smallest_distance_first() {
        let backend = populated(DistanceMetric::Euclid).await;
        let results = backend.query(vec![0.0, 0.0, 0.9], 3).await.unwrap();
        assert_eq!(results[0].chunk_id, "c");
        assert!((results[0].score - 0.1).abs() < 1e-5);
        assert!(results[0].score <= results[1].score);
        assert!(results[1].score <= results[2].score);
    }

    #[tokio::test]
    async fn test_query_empty_collection() {
        let backend = LocalBackend::in_memory(schema(DistanceMetric::Cosine)).unwrap();
        backend.ensure_collection().await.unwrap();
        assert!(backend.query(vec![1.0, 0.0, 0.0], 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_missing_collection() {
        let backend = LocalBackend::in_memory(schema(DistanceMetric::Cosine)).unwrap();
        assert!(matches!(
            backend.query(vec![1.0, 0.0, 0.0], 4).await,
            Err(VectorStoreError::MissingCollection(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let backend = LocalBackend::in_memory(schema(DistanceMetric::Cosine)).unwrap();
        backend.ensure_collection().await.unwrap();

        let result = backend
            .upsert(vec![entry("a", vec![1.0, 0.0, 0.0]), entry("b", vec![1.0])])
            .await;
        assert!(matches!(
            result,
            Err(VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
        // Nothing from the rejected batch was stored
        let info = backend.get_collection_info().await.unwrap().unwrap();
        assert_eq!(info.points_count, 0);

        assert!(matches!(
            backend.query(vec![1.0, 0.0], 1).await,
            Err(VectorStoreError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_upsert_same_id_replaces() {
        let backend = populated(DistanceMetric::Cosine).await;
        let mut replacement = entry("a", vec![0.0, 1.0, 0.0]);
        replacement.content = "updated".to_string();
        backend.upsert(vec![replacement]).await.unwrap();

        let info = backend.get_collection_info().await.unwrap().unwrap();
        assert_eq!(info.points_count, 3);

        let results = backend.query(vec![0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].chunk_id, "a");
        assert_eq!(results[0].content, "updated");
    }

    #[tokio::test]
    async fn test_clear_collection() {
        let backend = populated(DistanceMetric::Cosine).await;
        backend.clear_collection().await.unwrap();

        let info = backend.get_collection_info().await.unwrap().unwrap();
        assert_eq!(info.points_count, 0);
        assert!(backend.query(vec![1.0, 0.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = LocalBackend::in_memory(schema(DistanceMetric::Dot)).unwrap();
        assert!(backend.health_check().await.unwrap());
    }
}
