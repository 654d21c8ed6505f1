use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const APP_DIR: &str = "docrag";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "documents";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "mistral";
pub const DEFAULT_SOURCE_DIR: &str = "source_files";
pub const DEFAULT_CHUNK_SIZE: u32 = 3000;
pub const DEFAULT_CHUNK_OVERLAP: u32 = 200;
pub const DEFAULT_TOP_K: u32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join(APP_DIR))
    }

    pub fn models_dir() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("models"))
    }

    /// Load from the default location; a missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every setting that would otherwise fail half-way through a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunk_size = self.indexing.chunk_size;
        let overlap = self.indexing.chunk_overlap;
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ConfigError::ChunkerConfig {
                max_size: chunk_size as usize,
                overlap: overlap as usize,
            });
        }

        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }
        if self.embedding.model_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "embedding.model_id cannot be empty".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.vector_store.collection.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "vector_store.collection cannot be empty".to_string(),
            ));
        }
        if self.indexing.extensions.is_empty() {
            return Err(ConfigError::ValidationError(
                "indexing.extensions cannot be empty".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if let Some(score) = self.retrieval.min_score
            && !score.is_finite()
        {
            return Err(ConfigError::ValidationError(
                "retrieval.min_score must be a finite number".to_string(),
            ));
        }
        if let Some(ref template) = self.retrieval.prompt_template
            && !(template.contains("{context}") && template.contains("{question}"))
        {
            return Err(ConfigError::ValidationError(
                "retrieval.prompt_template must contain {context} and {question}".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// In-process sentence-transformer through ONNX Runtime
    #[default]
    Onnx,
    /// Remote text-embeddings-inference compatible server
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_max_tokens() -> u32 {
    256
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> u32 {
    32
}

fn default_max_retries() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model_id: default_embedding_model(),
            model_path: None,
            dimension: default_embedding_dimension(),
            max_tokens: default_max_tokens(),
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    /// SQLite file at `vector_store.path`
    #[default]
    Local,
    Qdrant,
    #[serde(alias = "postgres")]
    PostgreSQL,
}

impl fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorDriver::Local => write!(f, "local"),
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::PostgreSQL => write!(f, "postgresql"),
        }
    }
}

/// Distance metric of a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclid,
    Dot,
}

impl DistanceMetric {
    /// Whether a larger score means a closer match.
    pub fn higher_is_better(self) -> bool {
        !matches!(self, DistanceMetric::Euclid)
    }

    /// Score of `b` against `a`: similarity for cosine/dot, distance for euclid.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
            DistanceMetric::Euclid => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        }
    }

    /// Order two scores so that the more relevant one sorts first.
    pub fn rank(self, a: f32, b: f32) -> std::cmp::Ordering {
        let ord = a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal);
        if self.higher_is_better() {
            ord.reverse()
        } else {
            ord
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Euclid => write!(f, "euclid"),
            DistanceMetric::Dot => write!(f, "dot"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclid" | "euclidean" | "l2" => Ok(DistanceMetric::Euclid),
            "dot" | "inner" => Ok(DistanceMetric::Dot),
            _ => Err(format!("unknown distance metric: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub metric: DistanceMetric,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// PostgreSQL schema holding the collection tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_pool_acquire_timeout")]
    pub pool_acquire_timeout: u32,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_pool_max() -> u32 {
    5
}

fn default_pool_acquire_timeout() -> u32 {
    30
}

impl VectorStoreConfig {
    /// Location of the local index file, defaulting to the data directory.
    pub fn local_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| Config::data_dir().map(|p| p.join("index.db")))
    }

    /// Table name for the collection, qualified by schema when one is set.
    pub fn qualified_table_name(&self) -> String {
        let table = sanitize_identifier(&self.collection);
        match self.schema {
            Some(ref schema) => format!("{}.{}", sanitize_identifier(schema), table),
            None => table,
        }
    }
}

/// Reduce a collection name to a safe SQL identifier.
pub fn sanitize_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if ident.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            path: None,
            url: default_qdrant_url(),
            collection: default_collection(),
            metric: DistanceMetric::default(),
            api_key: None,
            schema: None,
            pool_max: default_pool_max(),
            pool_acquire_timeout: default_pool_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub recursive: bool,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    /// Key chunks by (source, index, content) so re-ingestion replaces instead of appending
    #[serde(default = "default_deduplicate")]
    pub deduplicate: bool,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SOURCE_DIR)
}

fn default_extensions() -> Vec<String> {
    vec!["txt".to_string()]
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> u32 {
    DEFAULT_CHUNK_OVERLAP
}

fn default_deduplicate() -> bool {
    true
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            extensions: default_extensions(),
            recursive: false,
            exclude_patterns: Vec::new(),
            max_file_size: default_max_file_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            deduplicate: default_deduplicate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,

    /// Replaces the built-in prompt; must contain `{context}` and `{question}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
            prompt_template: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_llm_timeout() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            url: default_ollama_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            temperature: None,
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub default_format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.model_id, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.vector_store.collection, DEFAULT_COLLECTION);
        assert_eq!(config.vector_store.metric, DistanceMetric::Cosine);
        assert_eq!(config.indexing.chunk_size, 3000);
        assert_eq!(config.indexing.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.llm.model, "mistral");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let mut config = Config::default();
        config.indexing.chunk_size = 100;
        config.indexing.chunk_overlap = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ChunkerConfig {
                max_size: 100,
                overlap: 100
            })
        ));

        config.indexing.chunk_size = 0;
        config.indexing.chunk_overlap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_dimension_and_top_k() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [vector_store]
            driver = "qdrant"
            collection = "LFP Battery"
            metric = "dot"

            [indexing]
            chunk_size = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.vector_store.driver, VectorDriver::Qdrant);
        assert_eq!(config.vector_store.metric, DistanceMetric::Dot);
        assert_eq!(config.indexing.chunk_size, 500);
        assert_eq!(config.indexing.chunk_overlap, 200);
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.retrieval.top_k = 7;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 7);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.retrieval.top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn test_metric_scores() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((DistanceMetric::Cosine.score(&a, &a) - 1.0).abs() < 1e-6);
        assert!(DistanceMetric::Cosine.score(&a, &b).abs() < 1e-6);
        assert!((DistanceMetric::Euclid.score(&a, &b) - 2f32.sqrt()).abs() < 1e-6);
        assert_eq!(DistanceMetric::Cosine.score(&a, &[0.0, 0.0]), 0.0);
        assert_eq!(
            DistanceMetric::Euclid.rank(0.1, 0.5),
            std::cmp::Ordering::Less
        );
        assert_eq!(
            DistanceMetric::Cosine.rank(0.1, 0.5),
            std::cmp::Ordering::Greater
        );
    }

    #[test]
    fn test_qualified_table_name() {
        let config = VectorStoreConfig {
            collection: "LFP Battery".to_string(),
            schema: Some("rag".to_string()),
            ..Default::default()
        };
        assert_eq!(config.qualified_table_name(), "rag.lfp_battery");
        assert_eq!(sanitize_identifier("2024-docs"), "_2024_docs");
    }
}
