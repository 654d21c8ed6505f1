//! Embedder abstraction.
//!
//! An embedder maps text to a fixed-dimension vector and is deterministic for a
//! given model. The same model must be used for ingestion and for queries
//! against one collection; its id is recorded in the collection schema.

mod http;
mod onnx;

pub use http::{HealthResponse, HttpEmbedder};
pub use onnx::OnnxEmbedder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::models::{Config, EmbeddingConfig, EmbeddingProvider};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identity recorded alongside the collection schema.
    fn model_id(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed texts for indexing, one vector per input in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Verify every vector has the expected length.
pub fn check_dimensions(vectors: &[Vec<f32>], expected: usize) -> Result<(), EmbeddingError> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(v) => Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: v.len(),
        }),
        None => Ok(()),
    }
}

/// Build the embedder selected by configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.provider {
        EmbeddingProvider::Onnx => {
            let model_dir = match config.model_path {
                Some(ref path) => path.clone(),
                None => Config::models_dir()
                    .ok_or_else(|| {
                        EmbeddingError::ModelNotFound(
                            "could not determine models directory".to_string(),
                        )
                    })?
                    .join(model_dir_name(&config.model_id)),
            };
            Ok(Arc::new(OnnxEmbedder::load(config, &model_dir)?))
        }
        EmbeddingProvider::Http => Ok(Arc::new(HttpEmbedder::new(config)?)),
    }
}

/// Directory name for a hub model id (`org/name` -> `org--name`).
pub fn model_dir_name(model_id: &str) -> String {
    model_id.replace('/', "--")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(&[vec![0.0; 3], vec![1.0; 3]], 3).is_ok());
        assert!(check_dimensions(&[], 3).is_ok());
        assert!(matches!(
            check_dimensions(&[vec![0.0; 3], vec![1.0; 2]], 3),
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_model_dir_name() {
        assert_eq!(
            model_dir_name("sentence-transformers/all-MiniLM-L6-v2"),
            "sentence-transformers--all-MiniLM-L6-v2"
        );
    }

    #[test]
    fn test_create_onnx_embedder_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            model_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(EmbeddingError::ModelNotFound(_))
        ));
    }
}
