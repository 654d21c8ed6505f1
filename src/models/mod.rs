mod config;
mod document;
mod search;

pub use config::{
    APP_DIR, Config, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_COLLECTION,
    DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_QDRANT_URL,
    DEFAULT_TOP_K, DistanceMetric, EmbeddingConfig, EmbeddingProvider, IndexingConfig, LlmConfig,
    LlmProvider, LoggingConfig, OutputConfig, RetrievalConfig, VectorDriver, VectorStoreConfig,
    sanitize_identifier,
};
pub use document::{
    CHECKSUM_KEY, Document, DocumentChunk, IndexEntry, Metadata, PATH_KEY, SOURCE_KEY,
};
pub use search::{OutputFormat, RetrievalResult, SearchResult};
