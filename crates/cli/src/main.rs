//! Deposition assistant CLI: the main entry point.
//!
//! Commands:
//! - `gateway`: Serve the HTTP API
//! - `chat`: Single-message or interactive chat in the terminal
//! - `frameworks`: List the agent strategies
//! - `config`: Show, locate, or validate configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "depo",
    about = "Deposition assistant: chat over legal deposition documents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to load instead of ~/.depo/config.toml
    #[arg(short, long, global = true, env = "DEPO_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind host
        #[arg(long)]
        host: Option<String>,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Conversation to continue (a new one is started by default)
        #[arg(long)]
        conversation: Option<String>,

        /// Strategy to run turns under (graph, managed-sync, managed-stream)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Document to bind to the conversation
        #[arg(short, long)]
        document: Option<PathBuf>,
    },

    /// List the available agent strategies
    Frameworks,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the default config file path
    Path,
    /// Load and validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Gateway { port, host } => commands::gateway::run(config_path, port, host).await?,
        Commands::Chat {
            message,
            conversation,
            strategy,
            document,
        } => {
            let options = commands::chat::ChatOptions {
                message,
                conversation,
                strategy,
                document,
            };
            commands::chat::run(config_path, options).await?
        }
        Commands::Frameworks => commands::frameworks(config_path)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
    }

    Ok(())
}
