//! Retrieval and prompt assembly.

use std::sync::Arc;
use std::time::Instant;

use super::embedding::Embedder;
use super::index::IndexHandle;
use crate::error::{ConfigError, RetrievalError};
use crate::models::{RetrievalConfig, RetrievalResult, SearchResult};

/// Separator between retrieved chunks in the prompt context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Use the following context to answer the question. \
If the answer is not in the context, say The information is not available.\n\n\
Context:\n{context}\n\n\
Question: {question}\n\
Answer:";

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

/// Embeds questions and fetches the nearest chunks from the index.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    min_score: Option<f32>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, config: &RetrievalConfig) -> Self {
        Self {
            embedder,
            min_score: config.min_score,
        }
    }

    /// Up to `k` chunks for `question`, most relevant first.
    pub async fn retrieve(
        &self,
        index: &IndexHandle,
        question: &str,
        k: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let schema = index.schema();
        if self.embedder.model_id() != schema.embedding_model {
            return Err(RetrievalError::ModelMismatch {
                embedder: self.embedder.model_id().to_string(),
                collection: schema.embedding_model.clone(),
            });
        }
        if self.embedder.dimension() != schema.dimension {
            return Err(RetrievalError::DimensionMismatch {
                embedder: self.embedder.dimension(),
                collection: schema.dimension,
            });
        }

        let start = Instant::now();
        let vector = self.embedder.embed_query(question).await?;
        let mut results = index.query(vector, k).await?;

        // Distances have no fixed scale, so the cutoff only applies to similarities
        if let Some(min_score) = self.min_score
            && schema.metric.higher_is_better()
        {
            results.retain(|r| r.score >= min_score);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            k,
            hits = results.len(),
            duration_ms,
            "retrieved context"
        );

        Ok(RetrievalResult::new(
            question.to_string(),
            k,
            schema.metric,
            results,
            duration_ms,
        ))
    }
}

/// Chunk texts joined in result order.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Context,
    Question,
}

/// Prompt with `{context}` and `{question}` placeholders.
///
/// The template is split into segments once, so text substituted for one
/// placeholder is never scanned for the other.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self, ConfigError> {
        let segments = parse_segments(template);
        let has = |wanted: &Segment| segments.iter().any(|s| s == wanted);
        if !has(&Segment::Context) || !has(&Segment::Question) {
            return Err(ConfigError::ValidationError(format!(
                "prompt template must contain {} and {}",
                CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER
            )));
        }
        Ok(Self { segments })
    }

    pub fn from_config(config: &RetrievalConfig) -> Result<Self, ConfigError> {
        match config.prompt_template {
            Some(ref template) => Self::new(template),
            None => Ok(Self::default()),
        }
    }

    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Context => out.push_str(context),
                Segment::Question => out.push_str(question),
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            segments: parse_segments(DEFAULT_PROMPT_TEMPLATE),
        }
    }
}

fn parse_segments(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = template;

    loop {
        let next = [
            (rest.find(CONTEXT_PLACEHOLDER), CONTEXT_PLACEHOLDER, Segment::Context),
            (rest.find(QUESTION_PLACEHOLDER), QUESTION_PLACEHOLDER, Segment::Question),
        ]
        .into_iter()
        .filter_map(|(pos, token, segment)| pos.map(|p| (p, token, segment)))
        .min_by_key(|(pos, _, _)| *pos);

        let Some((pos, token, segment)) = next else {
            if !rest.is_empty() {
                segments.push(Segment::Literal(rest.to_string()));
            }
            break;
        };

        if pos > 0 {
            segments.push(Segment::Literal(rest[..pos].to_string()));
        }
        segments.push(segment);
        rest = &rest[pos + token.len()..];
    }

    segments
}
