//! Command-line surface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Ask questions about a folder of text documents.
#[derive(Debug, Parser)]
#[command(name = "docrag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "DOCRAG_CONFIG",
        help = "Path to the configuration file"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Defaults to `chat` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read, chunk, embed and index the source folder
    Ingest(commands::IngestArgs),

    /// Show the chunks nearest to a query
    Search(commands::SearchArgs),

    /// Answer one question from the indexed documents
    Ask(commands::AskArgs),

    /// Interactive question loop
    Chat(commands::ChatArgs),

    /// Check the vector store, collection and language model
    Status,

    /// Delete every indexed chunk and recreate the collection
    Reset(commands::ResetArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
