//! Medbot CLI
//!
//! Main entry point for the medbot command-line tool: a medical question
//! answering assistant grounded in a local document index.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, PromptsCommand, StatsCommand};
use medbot_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;
use tracing::Instrument;

/// Medbot - medical question answering over your own documents
#[derive(Parser, Debug)]
#[command(name = "medbot")]
#[command(about = "Medical question answering grounded in a local document index", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "MEDBOT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "MEDBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace) or a full filter directive
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama)
    #[arg(short, long, global = true, env = "MEDBOT_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "MEDBOT_MODEL")]
    model: Option<String>,

    /// Vector index file
    #[arg(long, global = true, env = "MEDBOT_INDEX")]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive session
    Chat(ChatCommand),

    /// Answer a single question
    Ask(AskCommand),

    /// Show vector index statistics
    Stats(StatsCommand),

    /// List prompt overrides in the workspace
    Prompts(PromptsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load()?.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.index,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Medbot starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}, model: {}", config.provider, config.model);
    tracing::debug!("Index: {:?}", config.index_path());

    let command_name = match &cli.command {
        Commands::Chat(_) => "chat",
        Commands::Ask(_) => "ask",
        Commands::Stats(_) => "stats",
        Commands::Prompts(_) => "prompts",
    };
    let span = tracing::info_span!("command", name = command_name);

    let result = async move {
        match cli.command {
            Commands::Chat(cmd) => cmd.execute(&config).await,
            Commands::Ask(cmd) => cmd.execute(&config).await,
            Commands::Stats(cmd) => cmd.execute(&config),
            Commands::Prompts(cmd) => cmd.execute(&config),
        }
    }
    .instrument(span)
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) if e.is_fatal() => tracing::error!("Startup failed: {}", e),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
