//! Error types for the RAG pipeline.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to configuration. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("invalid chunker settings: max_size={max_size}, overlap={overlap} (need 0 <= overlap < max_size)")]
    ChunkerConfig { max_size: usize, overlap: usize },
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,

    #[error("embedding model not found: {0}")]
    ModelNotFound(String),

    #[error("failed to load embedding model: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError(msg) => is_transient_status(msg),
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Errors related to vector index operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("collection '{0}' does not exist")]
    MissingCollection(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error("vector dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("collection '{collection}' schema mismatch on {field}: stored {stored}, configured {configured}")]
    SchemaMismatch {
        collection: String,
        field: &'static str,
        stored: String,
        configured: String,
    },

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("pgvector extension error: {0}")]
    PgVectorExtensionError(String),
}

/// Errors related to ingestion. Per-file read failures are not errors; they are
/// recorded in the ingest report.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source folder not found: {0}")]
    SourceNotFound(String),

    #[error("directory walk error: {0}")]
    WalkError(String),

    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("embedder returned {actual} vectors for {expected} chunks")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("embedder model '{embedder}' does not match collection model '{collection}'")]
    ModelMismatch { embedder: String, collection: String },

    #[error("embedder produces {embedder}-dimensional vectors but the collection stores {collection}")]
    DimensionMismatch { embedder: usize, collection: usize },
}

/// Errors related to retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query cannot be empty")]
    EmptyQuery,

    #[error("query embedding failed: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vector search failed: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("embedder model '{embedder}' does not match collection model '{collection}'")]
    ModelMismatch { embedder: String, collection: String },

    #[error("embedder produces {embedder}-dimensional vectors but the collection stores {collection}")]
    DimensionMismatch { embedder: usize, collection: usize },
}

/// Errors raised by the answering language model.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to connect to language model server: {0}")]
    ConnectionError(String),

    #[error("language model server error: {0}")]
    ServerError(String),

    #[error("language model request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid language model response: {0}")]
    InvalidResponse(String),

    #[error("language model timeout")]
    Timeout,
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::ConnectionError(_) | LlmError::Timeout => true,
            LlmError::ServerError(msg) => is_transient_status(msg),
            LlmError::RequestError(e) => e.is_timeout() || e.is_connect(),
            LlmError::InvalidResponse(_) => false,
        }
    }
}

/// Errors from the end-to-end question answering path.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("answer generation failed: {0}")]
    Generation(#[from] LlmError),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("answer error: {0}")]
    Answer(#[from] AnswerError),

    #[error("{0}")]
    Other(String),
}

fn is_transient_status(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    msg.contains("503")
        || msg.contains("502")
        || msg.contains("504")
        || msg.contains("429")
        || lower.contains("unavailable")
        || lower.contains("too many requests")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_retryable() {
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(EmbeddingError::ServerError("status 503: busy".to_string()).is_retryable());
        assert!(!EmbeddingError::ServerError("status 400: bad input".to_string()).is_retryable());
        assert!(
            !EmbeddingError::DimensionMismatch {
                expected: 384,
                actual: 768
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_llm_error_retryable() {
        assert!(LlmError::ConnectionError("refused".to_string()).is_retryable());
        assert!(LlmError::ServerError("Service Unavailable".to_string()).is_retryable());
        assert!(!LlmError::InvalidResponse("missing field".to_string()).is_retryable());
    }

    #[test]
    fn test_answer_error_keeps_operation_context() {
        let err = AnswerError::from(RetrievalError::from(VectorStoreError::SearchError(
            "connection reset".to_string(),
        )));
        let msg = err.to_string();
        assert!(msg.contains("retrieval failed"));
        assert!(msg.contains("vector search failed"));
        assert!(msg.contains("connection reset"));
    }
}
