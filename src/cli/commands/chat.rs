use std::io::Write;

use anyhow::Result;
use clap::Args;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::ingest::run_ingest;
use super::{build_rag, open_index, resolve_k};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args, Default)]
pub struct ChatArgs {
    #[arg(short = 'k', long = "top-k", help = "Number of chunks to use as context")]
    pub k: Option<u32>,

    #[arg(long, help = "Ingest the source folder before the first question")]
    pub ingest: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Exit,
    Blank,
    Question(&'a str),
}

fn parse_input(line: &str) -> ChatInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        ChatInput::Blank
    } else if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        ChatInput::Exit
    } else {
        ChatInput::Question(line)
    }
}

pub async fn handle_chat(
    args: ChatArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let k = resolve_k(args.k, config)?;
    let (embedder, index) = open_index(config).await?;

    if args.ingest {
        let source_dir = config.indexing.source_dir.clone();
        let outcome = run_ingest(config, embedder.clone(), &index, &source_dir, format).await?;
        print!("{}", formatter.format_ingest(&outcome));
    }

    let rag = build_rag(config, embedder, index)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", style("Ask a question (or 'exit' to quit):").bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let question = match parse_input(&line) {
            ChatInput::Exit => break,
            ChatInput::Blank => continue,
            ChatInput::Question(question) => question,
        };

        match rag.ask(question, k).await {
            Ok(answer) => {
                if verbose {
                    eprintln!("Sources: {}", answer.retrieval().sources().join(", "));
                }
                println!("{}", formatter.format_answer(&answer));
            }
            Err(e) => {
                tracing::error!(error = %e, "question failed");
                eprintln!("{}", formatter.format_error(&format!("{e:#}")));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("exit"), ChatInput::Exit);
        assert_eq!(parse_input("  QUIT \n"), ChatInput::Exit);
        assert_eq!(parse_input("Exit"), ChatInput::Exit);
        assert_eq!(parse_input(""), ChatInput::Blank);
        assert_eq!(parse_input("   \t"), ChatInput::Blank);
        assert_eq!(
            parse_input("  What chemistry does the battery use? "),
            ChatInput::Question("What chemistry does the battery use?")
        );
        assert_eq!(parse_input("exit now"), ChatInput::Question("exit now"));
    }
}
