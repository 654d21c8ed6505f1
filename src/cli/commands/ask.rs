use anyhow::{Context, Result};
use clap::Args;

use super::{build_rag, open_index, resolve_k};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question to answer from the indexed documents")]
    pub question: String,

    #[arg(short = 'k', long = "top-k", help = "Number of chunks to use as context")]
    pub k: Option<u32>,

    #[arg(long, help = "Print the rendered prompt to stderr before answering")]
    pub show_prompt: bool,
}

pub async fn handle_ask(
    args: AskArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let k = resolve_k(args.k, config)?;
    let (embedder, index) = open_index(config).await?;
    let rag = build_rag(config, embedder, index)?;

    let prepared = rag
        .prepare(&args.question, k)
        .await
        .context("failed to retrieve context")?;
    if args.show_prompt {
        eprintln!("{}\n", prepared.prompt);
    }

    let answer = rag
        .answer(prepared)
        .await
        .context("failed to answer question")?;

    if verbose {
        let retrieval = answer.retrieval();
        eprintln!(
            "Retrieved {} of {} chunks in {}ms",
            retrieval.len(),
            retrieval.k,
            retrieval.duration_ms
        );
    }

    print!("{}", get_formatter(format).format_answer(&answer));
    Ok(())
}
