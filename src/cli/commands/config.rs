use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a configuration file with the default settings")]
    Init {
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show configuration and data paths")]
    Path,
}

/// `config_path` is the file the configuration was loaded from, if any.
pub async fn handle_config(
    cmd: ConfigCommand,
    config: &Config,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(config_path, force, format),
        ConfigCommand::Show => handle_show(config, format),
        ConfigCommand::Path => handle_path(config, config_path, format),
    }
}

fn target_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path
        .map(Path::to_path_buf)
        .or_else(Config::config_path)
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
}

fn handle_init(config_path: Option<&Path>, force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let path = target_path(config_path)?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save_to(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(config: &Config, format: OutputFormat) -> Result<()> {
    let mut shown = config.clone();
    if shown.vector_store.api_key.is_some() {
        shown.vector_store.api_key = Some("********".to_string());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
        OutputFormat::Text => print!("{}", toml::to_string_pretty(&shown)?),
    }
    Ok(())
}

fn handle_path(config: &Config, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let path = target_path(config_path)?;
    let index_path = config.vector_store.local_path();
    let models_dir = config.embedding.model_path.clone().or_else(Config::models_dir);

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "config": path,
            "config_exists": path.exists(),
            "local_index": index_path,
            "models": models_dir,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let state = if path.exists() { "active" } else { "would be" };
    println!("Config file ({state}): {}", path.display());
    if let Some(path) = index_path {
        println!("Local index:         {}", path.display());
    }
    if let Some(path) = models_dir {
        println!("Models:              {}", path.display());
    }
    Ok(())
}
