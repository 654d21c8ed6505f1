use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use docrag::cli::commands::{
    ChatArgs, handle_ask, handle_chat, handle_config, handle_ingest, handle_reset, handle_search,
    handle_status,
};
use docrag::cli::{Cli, Commands};
use docrag::models::{APP_DIR, Config, OutputFormat};

/// Detect ONNX Runtime library path and set ORT_DYLIB_PATH if not already set.
/// Must be called before any ort code runs.
fn detect_and_set_ort_path() {
    if std::env::var("ORT_DYLIB_PATH")
        .map(|p| Path::new(&p).exists())
        .unwrap_or(false)
    {
        return;
    }

    let home = std::env::var("HOME").unwrap_or_default();

    let found = if cfg!(target_os = "macos") {
        [
            format!("{home}/.local/lib/{APP_DIR}/libonnxruntime.dylib"),
            "/opt/homebrew/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
            "/usr/local/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else if cfg!(target_os = "linux") {
        [
            format!("{home}/.local/lib/{APP_DIR}/libonnxruntime.so"),
            "/usr/lib/libonnxruntime.so".into(),
            "/usr/local/lib/libonnxruntime.so".into(),
            "/usr/lib/x86_64-linux-gnu/libonnxruntime.so".into(),
            "/usr/lib/aarch64-linux-gnu/libonnxruntime.so".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else {
        None
    };

    if let Some(path) = found {
        // SAFETY: Called at program start before any threads are spawned.
        unsafe {
            std::env::set_var("ORT_DYLIB_PATH", path);
        }
    }
}

/// Log to stderr so answers and JSON on stdout stay clean. `RUST_LOG` wins
/// over the configured level.
fn init_logging(config: &Config, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            "debug"
        } else {
            config.logging.level.as_str()
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    detect_and_set_ort_path();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path: Option<PathBuf> = cli.config.clone().or_else(Config::config_path);
    let config = match config_path {
        Some(ref path) => Config::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };

    init_logging(&config, cli.verbose);

    let format = cli.format.unwrap_or(config.output.default_format);
    let command = cli.command.unwrap_or(Commands::Chat(ChatArgs::default()));

    // `config` subcommands must work on a broken file so it can be repaired
    if !matches!(command, Commands::Config(_)) {
        config.validate().context("invalid configuration")?;
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async {
        tokio::select! {
            result = run_command(command, &config, config_path.as_deref(), format, cli.verbose) => {
                result?;
            }
            _ = shutdown_signal() => {
                eprintln!("\nReceived shutdown signal, cleaning up...");
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

async fn run_command(
    command: Commands,
    config: &Config,
    config_path: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    match command {
        Commands::Ingest(args) => handle_ingest(args, config, format, verbose).await?,
        Commands::Search(args) => handle_search(args, config, format, verbose).await?,
        Commands::Ask(args) => handle_ask(args, config, format, verbose).await?,
        Commands::Chat(args) => handle_chat(args, config, format, verbose).await?,
        Commands::Status => handle_status(config, format, verbose).await?,
        Commands::Reset(args) => handle_reset(args, config, format, verbose).await?,
        Commands::Config(cmd) => handle_config(cmd, config, config_path, format).await?,
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
