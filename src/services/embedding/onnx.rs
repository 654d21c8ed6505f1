//! In-process sentence-transformer embeddings through ONNX Runtime.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{Array1, Ix2, Ix3, s};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};

use super::{Embedder, check_dimensions};
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    needs_token_type_ids: bool,
}

/// Mean-pooled, L2-normalized sentence embeddings (the all-MiniLM-L6-v2 recipe).
#[derive(Clone)]
pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,
    model_id: String,
    batch_size: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_path = find_model_file(model_dir).ok_or_else(|| {
            EmbeddingError::ModelNotFound(format!("no model.onnx in {}", model_dir.display()))
        })?;
        let tokenizer_path = model_dir.join("tokenizer.json");

        let session = Session::builder()
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| EmbeddingError::LoadError(e.to_string()))?;

        let needs_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        // Truncate long chunks instead of running out of memory
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        let model = OnnxModel {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.dimension as usize,
            needs_token_type_ids,
        };

        // A wrong `embedding.dimension` must fail here, not at the first upsert
        model.embed(&["dimension check".to_string()])?;

        tracing::info!(
            model = %config.model_id,
            path = %model_path.display(),
            dimension = config.dimension,
            "embedding model loaded"
        );

        Ok(Self {
            model: Arc::new(model),
            model_id: config.model_id.clone(),
            batch_size: (config.batch_size as usize).max(1),
        })
    }

    async fn embed_blocking(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.embed(&texts))
            .await
            .map_err(|e| EmbeddingError::InferenceError(e.to_string()))?
    }
}

impl OnnxModel {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let row = i * max_len;
            for (j, ((&id, &mask), &type_id)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids())
                .enumerate()
            {
                input_ids[row + j] = i64::from(id);
                attention_mask[row + j] = i64::from(mask);
                token_type_ids[row + j] = i64::from(type_id);
            }
        }

        let ids_tensor = Tensor::from_array(([batch_size, max_len], input_ids))
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;
        let mask_tensor = Tensor::from_array(([batch_size, max_len], attention_mask.clone()))
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;

        let mut inputs = ort::inputs![
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor
        ];
        if self.needs_token_type_ids {
            let type_tensor = Tensor::from_array(([batch_size, max_len], token_type_ids))
                .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;
            inputs.push(("token_type_ids".into(), type_tensor.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = session
            .run(inputs)
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| EmbeddingError::InferenceError(e.to_string()))?;

        let embeddings: Vec<Vec<f32>> = match output.ndim() {
            // token embeddings: [batch, seq, hidden] -> mean over unmasked tokens
            3 => {
                let hidden = output
                    .into_dimensionality::<Ix3>()
                    .map_err(|e| EmbeddingError::InferenceError(e.to_string()))?;
                let width = hidden.shape()[2];
                (0..batch_size)
                    .map(|i| {
                        let mut sum = Array1::<f32>::zeros(width);
                        let mut count = 0.0f32;
                        for j in 0..max_len {
                            if attention_mask[i * max_len + j] > 0 {
                                sum += &hidden.slice(s![i, j, ..]);
                                count += 1.0;
                            }
                        }
                        if count > 0.0 {
                            sum /= count;
                        }
                        normalize(sum.to_vec())
                    })
                    .collect()
            }
            // already pooled: [batch, hidden]
            2 => {
                let pooled = output
                    .into_dimensionality::<Ix2>()
                    .map_err(|e| EmbeddingError::InferenceError(e.to_string()))?;
                pooled
                    .outer_iter()
                    .map(|row| normalize(row.to_vec()))
                    .collect()
            }
            _ => {
                return Err(EmbeddingError::InferenceError(format!(
                    "unexpected output shape: {:?}",
                    output.shape()
                )));
            }
        };

        check_dimensions(&embeddings, self.dimension)?;
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.model.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all_embeddings.extend(self.embed_blocking(batch.to_vec()).await?);
        }
        Ok(all_embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_blocking(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding output".to_string()))
    }
}

fn find_model_file(model_dir: &Path) -> Option<PathBuf> {
    [
        model_dir.join("model.onnx"),
        model_dir.join("onnx").join("model.onnx"),
    ]
    .into_iter()
    .find(|p| p.exists())
}

fn normalize(v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.into_iter().map(|x| x / norm).collect()
    } else {
        v
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
