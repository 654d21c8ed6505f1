//! Question answering over the index: retrieve, render the prompt, generate.

use std::sync::Arc;

use serde::Serialize;

use super::embedding::Embedder;
use super::index::IndexHandle;
use super::llm::LanguageModel;
use super::retrieval::{PromptTemplate, Retriever, build_context};
use crate::error::{AnswerError, ConfigError, RetrievalError};
use crate::models::{RetrievalConfig, RetrievalResult};

/// A rendered prompt and the retrieval it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedPrompt {
    pub prompt: String,
    pub retrieval: RetrievalResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Answer {
    /// Retrieval came back empty; the language model was not asked.
    NothingFound { retrieval: RetrievalResult },
    Generated {
        text: String,
        sources: Vec<String>,
        retrieval: RetrievalResult,
    },
}

impl Answer {
    pub fn retrieval(&self) -> &RetrievalResult {
        match self {
            Answer::NothingFound { retrieval } | Answer::Generated { retrieval, .. } => retrieval,
        }
    }
}

pub struct RagSystem {
    index: Arc<IndexHandle>,
    retriever: Retriever,
    llm: Arc<dyn LanguageModel>,
    template: PromptTemplate,
}

impl RagSystem {
    pub fn new(
        index: Arc<IndexHandle>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        config: &RetrievalConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            index,
            retriever: Retriever::new(embedder, config),
            llm,
            template: PromptTemplate::from_config(config)?,
        })
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Retrieve `k` chunks for `question` and render the prompt around them.
    pub async fn prepare(&self, question: &str, k: usize) -> Result<PreparedPrompt, RetrievalError> {
        let retrieval = self.retriever.retrieve(&self.index, question, k).await?;
        let context = build_context(&retrieval.results);
        let prompt = self.template.render(&context, &retrieval.query);
        Ok(PreparedPrompt { prompt, retrieval })
    }

    /// Answer `question` from the `k` most relevant chunks.
    pub async fn ask(&self, question: &str, k: usize) -> Result<Answer, AnswerError> {
        let prepared = self.prepare(question, k).await?;
        self.answer(prepared).await
    }

    /// Generate an answer from an already prepared prompt, without retrieving
    /// again.
    pub async fn answer(&self, prepared: PreparedPrompt) -> Result<Answer, AnswerError> {
        let PreparedPrompt { prompt, retrieval } = prepared;
        let k = retrieval.k;

        if retrieval.is_empty() {
            tracing::info!(k, "no context found, skipping generation");
            return Ok(Answer::NothingFound { retrieval });
        }

        let text = self.llm.generate(&prompt).await?;
        tracing::info!(
            model = %self.llm.model_id(),
            chunks = retrieval.len(),
            answer_chars = text.len(),
            "answer generated"
        );

        Ok(Answer::Generated {
            text: text.trim().to_string(),
            sources: retrieval.sources(),
            retrieval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::models::IndexingConfig;
    use crate::services::ingest::{IngestOutcome, Ingestor};
    use crate::services::testing::{CannedModel, FailingEmbedder, HashEmbedder, local_index};
    use std::fs;

    const DIM: usize = 256;

    async fn battery_system(
        llm: Arc<CannedModel>,
    ) -> (tempfile::TempDir, tempfile::TempDir, RagSystem) {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), "The battery uses LFP chemistry.").unwrap();
        fs::write(src.path().join("b.txt"), "Weather today is sunny.").unwrap();

        let embedder = Arc::new(HashEmbedder::new(DIM));
        let (dir, index) = local_index(DIM).await;
        let outcome = Ingestor::new(&IndexingConfig::default(), embedder.clone())
            .unwrap()
            .ingest(&index, src.path())
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Ingested(ref r) if r.chunks == 2));

        let rag = RagSystem::new(
            Arc::new(index),
            embedder,
            llm,
            &RetrievalConfig::default(),
        )
        .unwrap();
        (src, dir, rag)
    }

    #[tokio::test]
    async fn test_end_to_end_battery_question() {
        let llm = Arc::new(CannedModel::new("LFP chemistry."));
        let (_src, _dir, rag) = battery_system(llm.clone()).await;
        let question = "What chemistry does the battery use?";

        let prepared = rag.prepare(question, 1).await.unwrap();
        assert_eq!(prepared.retrieval.len(), 1);
        assert_eq!(prepared.retrieval.results[0].content, "The battery uses LFP chemistry.");
        assert_eq!(prepared.retrieval.results[0].source(), "a.txt");
        assert!(prepared.prompt.contains("The battery uses LFP chemistry."));
        assert!(prepared.prompt.contains(question));
        assert!(!prepared.prompt.contains("sunny"));

        match rag.ask(question, 1).await.unwrap() {
            Answer::Generated { text, sources, .. } => {
                assert_eq!(text, "LFP chemistry.");
                assert_eq!(sources, vec!["a.txt".to_string()]);
            }
            other => panic!("expected an answer, got {other:?}"),
        }
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_requested_k_reaches_the_prompt() {
        let llm = Arc::new(CannedModel::new("ok"));
        let (_src, _dir, rag) = battery_system(llm.clone()).await;

        let answer = rag.ask("What chemistry does the battery use?", 2).await.unwrap();
        assert_eq!(answer.retrieval().len(), 2);

        let prompt = &llm.prompts()[0];
        let first = prompt.find("LFP chemistry").unwrap();
        let second = prompt.find("Weather today is sunny.").unwrap();
        assert!(first < second);
        assert!(prompt.contains("LFP chemistry.\n\nWeather today is sunny."));
    }

    #[tokio::test]
    async fn test_answer_sends_the_prepared_prompt() {
        let llm = Arc::new(CannedModel::new("LFP chemistry."));
        let (_src, _dir, rag) = battery_system(llm.clone()).await;

        let prepared = rag.prepare("What chemistry does the battery use?", 1).await.unwrap();
        let shown = prepared.prompt.clone();
        let answer = rag.answer(prepared).await.unwrap();

        assert!(matches!(answer, Answer::Generated { .. }));
        assert_eq!(llm.prompts(), vec![shown]);
    }

    #[tokio::test]
    async fn test_empty_index_does_not_call_model() {
        let llm = Arc::new(CannedModel::new("The information is not available."));
        let (_dir, index) = local_index(DIM).await;
        let rag = RagSystem::new(
            Arc::new(index),
            Arc::new(HashEmbedder::new(DIM)),
            llm.clone(),
            &RetrievalConfig::default(),
        )
        .unwrap();

        let answer = rag.ask("anything?", 4).await.unwrap();
        assert!(matches!(answer, Answer::NothingFound { .. }));
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_is_not_an_answer() {
        let llm = Arc::new(CannedModel::failing());
        let (_src, _dir, rag) = battery_system(llm).await;
        let err = rag.ask("What chemistry?", 1).await.unwrap_err();
        assert!(matches!(err, AnswerError::Generation(LlmError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let (_dir, index) = local_index(DIM).await;
        let rag = RagSystem::new(
            Arc::new(index),
            Arc::new(FailingEmbedder::new(DIM)),
            Arc::new(CannedModel::new("unused")),
            &RetrievalConfig::default(),
        )
        .unwrap();
        let err = rag.ask("anything?", 4).await.unwrap_err();
        assert!(matches!(
            err,
            AnswerError::Retrieval(RetrievalError::EmbeddingError(_))
        ));
    }
}
