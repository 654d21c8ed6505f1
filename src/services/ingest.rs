//! Ingestion pipeline: read source files, chunk, embed, upsert.
//!
//! Unreadable files are logged and recorded in the report; they never abort
//! the batch. Backend and embedding failures do.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use serde::Serialize;
use walkdir::WalkDir;

use super::chunker::TextChunker;
use super::embedding::Embedder;
use super::index::IndexHandle;
use crate::error::{ConfigError, IngestError};
use crate::models::{
    CHECKSUM_KEY, Document, DocumentChunk, IndexEntry, IndexingConfig, Metadata, PATH_KEY,
};
use crate::utils::file::{calculate_checksum, file_name, has_extension, read_file_content};

/// Chunks embedded per embedder call, so the progress bar moves.
const EMBED_BATCH: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// What one ingestion run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub source_dir: PathBuf,
    /// Files matching the extension filter
    pub files_found: usize,
    pub files_read: usize,
    pub skipped: Vec<SkippedFile>,
    /// Readable files with no content to index
    pub empty_documents: usize,
    pub chunks: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Nothing readable was found; the index was not touched.
    NoDocuments { report: IngestReport },
    Ingested(IngestReport),
}

impl IngestOutcome {
    pub fn report(&self) -> &IngestReport {
        match self {
            IngestOutcome::NoDocuments { report } | IngestOutcome::Ingested(report) => report,
        }
    }

    pub fn chunks(&self) -> usize {
        match self {
            IngestOutcome::NoDocuments { .. } => 0,
            IngestOutcome::Ingested(report) => report.chunks,
        }
    }
}

pub struct Ingestor {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    config: IndexingConfig,
    progress: Option<ProgressBar>,
}

impl Ingestor {
    pub fn new(config: &IndexingConfig, embedder: Arc<dyn Embedder>) -> Result<Self, ConfigError> {
        Ok(Self {
            chunker: TextChunker::from_config(config)?,
            embedder,
            config: config.clone(),
            progress: None,
        })
    }

    /// Report embedding progress (in chunks) on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Ingest every matching file under `source_dir` into `index`.
    pub async fn ingest(
        &self,
        index: &IndexHandle,
        source_dir: &Path,
    ) -> Result<IngestOutcome, IngestError> {
        let start = Instant::now();
        let schema = index.schema();
        if self.embedder.model_id() != schema.embedding_model {
            return Err(IngestError::ModelMismatch {
                embedder: self.embedder.model_id().to_string(),
                collection: schema.embedding_model.clone(),
            });
        }
        if self.embedder.dimension() != schema.dimension {
            return Err(IngestError::DimensionMismatch {
                embedder: self.embedder.dimension(),
                collection: schema.dimension,
            });
        }
        if !source_dir.is_dir() {
            return Err(IngestError::SourceNotFound(source_dir.display().to_string()));
        }

        let mut report = IngestReport {
            source_dir: source_dir.to_path_buf(),
            ..Default::default()
        };

        let files = self.collect_files(source_dir)?;
        report.files_found = files.len();

        let mut documents = Vec::new();
        for path in files {
            match self.load_document(source_dir, &path) {
                Ok(document) => {
                    report.files_read += 1;
                    documents.push(document);
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable file");
                    report.skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut chunks: Vec<DocumentChunk> = Vec::new();
        for document in &documents {
            let document_chunks = self.chunker.chunk(document);
            if document_chunks.is_empty() {
                tracing::info!(file = %document.source(), "skipping empty document");
                report.empty_documents += 1;
                continue;
            }
            tracing::debug!(file = %document.source(), chunks = document_chunks.len(), "chunked");
            chunks.extend(document_chunks);
        }
        drop(documents);

        if chunks.is_empty() {
            report.duration_ms = start.elapsed().as_millis() as u64;
            tracing::info!(dir = %source_dir.display(), "no documents to ingest");
            return Ok(IngestOutcome::NoDocuments { report });
        }

        let vectors = self.embed_chunks(&chunks).await?;
        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let entry = IndexEntry::from_chunk(chunk, vector);
                if self.config.deduplicate {
                    entry
                } else {
                    entry.with_random_id()
                }
            })
            .collect();

        report.chunks = entries.len();
        index.upsert(entries).await?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            files = report.files_read,
            skipped = report.skipped.len(),
            chunks = report.chunks,
            collection = %index.schema().name,
            "ingestion complete"
        );
        Ok(IngestOutcome::Ingested(report))
    }

    /// Matching files in sorted order. Only the top level is scanned unless
    /// `recursive` is set. Symlinks to files are kept, including broken ones,
    /// so a link that cannot be read is reported as skipped. Directory links
    /// are not descended into.
    fn collect_files(&self, source_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let max_depth = if self.config.recursive { usize::MAX } else { 1 };
        let excludes: Vec<glob::Pattern> = self
            .config
            .exclude_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();

        let mut files = Vec::new();
        for entry in WalkDir::new(source_dir)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| IngestError::WalkError(e.to_string()))?;
            let path = entry.path();

            let is_file =
                entry.file_type().is_file() || (entry.path_is_symlink() && !path.is_dir());
            if !is_file || !has_extension(path, &self.config.extensions) {
                continue;
            }

            let path_str = path.to_string_lossy();
            if excludes.iter().any(|p| p.matches(&path_str)) {
                tracing::debug!(file = %path.display(), "excluded");
                continue;
            }

            files.push(path.to_path_buf());
        }

        Ok(files)
    }

    /// Documents are keyed on their path relative to `source_dir`, so equal
    /// file names in different subfolders stay distinct.
    fn load_document(&self, source_dir: &Path, path: &Path) -> std::io::Result<Document> {
        let content = read_file_content(path, self.config.max_file_size)?;

        let mut metadata = Metadata::new();
        metadata.insert(PATH_KEY.to_string(), path.to_string_lossy().to_string());
        metadata.insert(CHECKSUM_KEY.to_string(), calculate_checksum(&content));

        let relative = path.strip_prefix(source_dir).unwrap_or(path).to_string_lossy();
        Ok(Document::new(content, file_name(path), metadata).with_key(&relative))
    }

    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>, IngestError> {
        if let Some(ref pb) = self.progress {
            pb.set_length(chunks.len() as u64);
            pb.set_position(0);
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = self.embedder.embed_documents(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(IngestError::EmbeddingCountMismatch {
                    expected: texts.len(),
                    actual: embedded.len(),
                });
            }
            vectors.extend(embedded);

            if let Some(ref pb) = self.progress {
                pb.inc(batch.len() as u64);
            }
        }

        if let Some(ref pb) = self.progress {
            pb.finish_and_clear();
        }
        Ok(vectors)
    }
}
