mod chunker;
mod embedding;
mod index;
mod ingest;
mod llm;
mod rag;
mod retrieval;
pub mod vector_store;

#[cfg(test)]
mod testing;

pub use chunker::{Span, TextChunker};
pub use embedding::{
    Embedder, HealthResponse, HttpEmbedder, OnnxEmbedder, check_dimensions, create_embedder,
    model_dir_name,
};
pub use index::{IndexHandle, schema_from_config};
pub use ingest::{IngestOutcome, IngestReport, Ingestor, SkippedFile};
pub use llm::{LanguageModel, OllamaClient, create_language_model};
pub use rag::{Answer, PreparedPrompt, RagSystem};
pub use retrieval::{
    CONTEXT_SEPARATOR, DEFAULT_PROMPT_TEMPLATE, PromptTemplate, Retriever, build_context,
};
pub use vector_store::{CollectionInfo, CollectionSchema, VectorStore, create_backend};
