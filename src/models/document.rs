use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String key/value metadata carried from a document to its chunks.
pub type Metadata = BTreeMap<String, String>;

pub const SOURCE_KEY: &str = "source";
pub const PATH_KEY: &str = "path";
pub const CHECKSUM_KEY: &str = "checksum";

/// A unit of source content, discarded once it has been chunked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn generate_id(source: &str) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(source.as_bytes());
        hex::encode(&hash[..16])
    }

    /// Create a document whose identity is its `source` name.
    pub fn new(content: String, source: impl Into<String>, mut metadata: Metadata) -> Self {
        let source = source.into();
        let id = Self::generate_id(&source);
        metadata.insert(SOURCE_KEY.to_string(), source);
        Self {
            id,
            content,
            metadata,
        }
    }

    /// Key the document identity on `key` instead of the source name.
    pub fn with_key(mut self, key: &str) -> Self {
        self.id = Self::generate_id(key);
        self
    }

    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map_or("", String::as_str)
    }
}

/// A contiguous slice of a document. Offsets count characters, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub start_offset: u64,
    pub end_offset: u64,
    pub metadata: Metadata,
}

impl DocumentChunk {
    /// Stable id over (document id, chunk index, content).
    pub fn generate_id(document_id: &str, chunk_index: u32, content: &str) -> String {
        use uuid::Uuid;
        let checksum = crate::utils::calculate_checksum(content);
        let name = format!("{}:{}:{}", document_id, chunk_index, checksum);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn from_document(
        document: &Document,
        content: String,
        chunk_index: u32,
        total_chunks: u32,
        start_offset: u64,
        end_offset: u64,
    ) -> Self {
        let id = Self::generate_id(&document.id, chunk_index, &content);
        Self {
            id,
            document_id: document.id.clone(),
            content,
            chunk_index,
            total_chunks,
            start_offset,
            end_offset,
            metadata: document.metadata.clone(),
        }
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// What the vector index persists for one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

impl IndexEntry {
    pub fn from_chunk(chunk: DocumentChunk, vector: Vec<f32>) -> Self {
        let mut metadata = chunk.metadata;
        metadata.insert("document_id".to_string(), chunk.document_id);
        metadata.insert("chunk_index".to_string(), chunk.chunk_index.to_string());
        Self {
            id: chunk.id,
            content: chunk.content,
            metadata,
            vector,
        }
    }

    /// Replace the id with a fresh random one, so upserting appends.
    pub fn with_random_id(mut self) -> Self {
        self.id = uuid::Uuid::new_v4().to_string();
        self
    }
}
