//! Deterministic stand-ins for the embedding model and the language model.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use super::embedding::Embedder;
use super::index::IndexHandle;
use super::llm::LanguageModel;
use super::vector_store::{CollectionSchema, LocalBackend};
use crate::error::{EmbeddingError, LlmError};
use crate::models::DistanceMetric;

pub const HASH_MODEL_ID: &str = "test/hash-embedder";

/// Bag-of-words embedder: every lowercase word bumps one hashed dimension.
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self::with_model_id(dimension, HASH_MODEL_ID)
    }

    pub fn with_model_id(dimension: usize, model_id: &str) -> Self {
        Self {
            dimension,
            model_id: model_id.to_string(),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector(text))
    }
}

/// Embedder whose server is always down.
pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_id(&self) -> &str {
        HASH_MODEL_ID
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::ConnectionError("connection refused".to_string()))
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::ConnectionError("connection refused".to_string()))
    }
}

/// Language model that returns a fixed reply (or fails) and records prompts.
pub struct CannedModel {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl CannedModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for CannedModel {
    fn model_id(&self) -> &str {
        "test/canned"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| LlmError::ConnectionError("connection refused".to_string()))
    }
}

/// Empty collection in a fresh on-disk index, matching [`HashEmbedder`].
pub async fn local_index(dimension: usize) -> (TempDir, IndexHandle) {
    let dir = tempfile::tempdir().unwrap();
    let schema = CollectionSchema::new("test", dimension, DistanceMetric::Cosine, HASH_MODEL_ID);
    let backend = LocalBackend::open(&dir.path().join("index.db"), schema).unwrap();
    let index = IndexHandle::with_store(Arc::new(backend)).await.unwrap();
    (dir, index)
}
