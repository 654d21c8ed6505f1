use anyhow::{Context, Result};
use clap::Args;

use super::{open_index, resolve_k};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::Retriever;

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(short = 'k', long = "top-k", help = "Number of chunks to return")]
    pub k: Option<u32>,

    #[arg(long, help = "Drop hits scoring below this similarity")]
    pub min_score: Option<f32>,
}

pub async fn handle_search(
    args: SearchArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }
    let k = resolve_k(args.k, config)?;

    let mut retrieval_config = config.retrieval.clone();
    if let Some(score) = args.min_score {
        if !score.is_finite() {
            anyhow::bail!("min_score must be a finite number");
        }
        retrieval_config.min_score = Some(score);
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  k: {k}");
        if let Some(score) = retrieval_config.min_score {
            eprintln!("  Min score: {score:.3}");
        }
    }

    let (embedder, index) = open_index(config).await?;
    let retriever = Retriever::new(embedder, &retrieval_config);
    let result = retriever
        .retrieve(&index, query, k)
        .await
        .context("search failed")?;

    if verbose {
        eprintln!("Timing: {}ms", result.duration_ms);
    }

    print!("{}", get_formatter(format).format_retrieval(&result));
    Ok(())
}
