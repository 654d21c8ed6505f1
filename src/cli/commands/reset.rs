use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::IndexHandle;

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub force: bool,
}

pub async fn handle_reset(
    args: ResetArgs,
    config: &Config,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let collection = &config.vector_store.collection;

    if !args.force {
        print!(
            "Delete every chunk in collection '{}' and recreate it? [y/N] ",
            collection
        );
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", formatter.format_message("Cancelled."));
            return Ok(());
        }
    }

    // Skip schema verification: reset is how a mismatched collection gets rebuilt
    let index = IndexHandle::connect(config)
        .await
        .context("failed to connect to vector store")?;
    index
        .reset()
        .await
        .with_context(|| format!("failed to reset collection '{}'", collection))?;

    println!(
        "{}",
        formatter.format_message(&format!("Collection '{}' has been reset.", collection))
    );
    Ok(())
}
