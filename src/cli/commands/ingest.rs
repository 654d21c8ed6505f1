use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use super::open_index;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{Embedder, IndexHandle, IngestOutcome, Ingestor};

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(long, short = 's', help = "Folder to ingest (defaults to indexing.source_dir)")]
    pub source_dir: Option<PathBuf>,

    #[arg(long, short = 'r', help = "Descend into subdirectories")]
    pub recursive: bool,

    #[arg(long, help = "Give every chunk a fresh id instead of replacing unchanged ones")]
    pub no_dedup: bool,
}

pub async fn handle_ingest(
    args: IngestArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let mut config = config.clone();
    if args.recursive {
        config.indexing.recursive = true;
    }
    if args.no_dedup {
        config.indexing.deduplicate = false;
    }
    let source_dir = args
        .source_dir
        .unwrap_or_else(|| config.indexing.source_dir.clone());

    if verbose {
        eprintln!("Source: {}", source_dir.display());
        eprintln!("  Extensions: {}", config.indexing.extensions.join(", "));
        eprintln!(
            "  Chunking: {} chars, {} overlap",
            config.indexing.chunk_size, config.indexing.chunk_overlap
        );
        eprintln!("  Collection: {}", config.vector_store.collection);
    }

    let (embedder, index) = open_index(&config).await?;
    let outcome = run_ingest(&config, embedder, &index, &source_dir, format).await?;

    print!("{}", get_formatter(format).format_ingest(&outcome));
    Ok(())
}

/// Ingest `source_dir` into `index`, with a progress bar for text output.
pub(super) async fn run_ingest(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    index: &IndexHandle,
    source_dir: &Path,
    format: OutputFormat,
) -> Result<IngestOutcome> {
    let mut ingestor = Ingestor::new(&config.indexing, embedder).context("invalid chunker settings")?;

    let progress = (format == OutputFormat::Text).then(|| {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    });
    if let Some(ref pb) = progress {
        ingestor = ingestor.with_progress(pb.clone());
    }

    let result = ingestor.ingest(index, source_dir).await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    result.with_context(|| format!("failed to ingest {}", source_dir.display()))
}
