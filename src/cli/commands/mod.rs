mod ask;
mod chat;
mod config;
mod ingest;
mod reset;
mod search;
mod status;

pub use ask::AskArgs;
pub use chat::ChatArgs;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;
pub use reset::ResetArgs;
pub use search::SearchArgs;

pub use ask::handle_ask;
pub use chat::handle_chat;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use reset::handle_reset;
pub use search::handle_search;
pub use status::handle_status;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::Config;
use crate::services::{Embedder, IndexHandle, RagSystem, create_embedder, create_language_model};

/// Requested result count, falling back to `retrieval.top_k`.
fn resolve_k(k: Option<u32>, config: &Config) -> Result<usize> {
    let k = k.unwrap_or(config.retrieval.top_k);
    if k == 0 {
        anyhow::bail!("k must be at least 1");
    }
    Ok(k as usize)
}

/// Embedder and opened index for the configured collection.
async fn open_index(config: &Config) -> Result<(Arc<dyn Embedder>, Arc<IndexHandle>)> {
    let embedder = create_embedder(&config.embedding).context("failed to load embedder")?;
    let index = IndexHandle::open(config)
        .await
        .context("failed to open vector index")?;
    Ok((embedder, Arc::new(index)))
}

fn build_rag(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    index: Arc<IndexHandle>,
) -> Result<RagSystem> {
    let llm = create_language_model(&config.llm).context("failed to create language model")?;
    RagSystem::new(index, embedder, Arc::from(llm), &config.retrieval)
        .context("invalid retrieval settings")
}
